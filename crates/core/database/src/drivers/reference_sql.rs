use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use usersync_result::DBError;

use crate::{AbstractDatabaseSql, UserEssentials};

/// In-memory database, keeps track of how often it was opened and closed
#[derive(Default, Debug)]
pub struct ReferenceSqlDb {
  pub users: Arc<Mutex<HashMap<u64, UserEssentials>>>,
  pub(crate) connected: AtomicBool,
  pub(crate) connects: AtomicUsize,
  pub(crate) disconnects: AtomicUsize,
}

impl ReferenceSqlDb {
  pub async fn insert_user(&self, user: UserEssentials) {
    self.users.lock().await.insert(user.id, user);
  }

  pub fn is_connected(&self) -> bool {
    self.connected.load(Ordering::SeqCst)
  }

  /// Number of connections actually opened
  pub fn connect_count(&self) -> usize {
    self.connects.load(Ordering::SeqCst)
  }

  /// Number of connections actually closed
  pub fn disconnect_count(&self) -> usize {
    self.disconnects.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl AbstractDatabaseSql for ReferenceSqlDb {
  async fn connect(&self) -> Result<(), DBError> {
    if !self.connected.swap(true, Ordering::SeqCst) {
      self.connects.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
  }

  async fn disconnect(&self) {
    if self.connected.swap(false, Ordering::SeqCst) {
      self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
  }
}
