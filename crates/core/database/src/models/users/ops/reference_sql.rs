use std::sync::atomic::Ordering;

use async_trait::async_trait;
use usersync_result::{DBError, ErrorType};

use crate::{ReferenceSqlDb, UserEssentials, UsersRepository};

#[async_trait()]
impl UsersRepository for ReferenceSqlDb {
  async fn users_get_by_id(&self, user_id: u64) -> Result<Option<UserEssentials>, DBError> {
    let path = "database.users.users_get_by_id".to_string();

    if !self.connected.load(Ordering::SeqCst) {
      let msg = "not connected to a database".to_string();
      return Err(DBError { err_type: ErrorType::NotConnected, msg, path, ..Default::default() });
    }

    let users = self.users.lock().await;
    Ok(users.get(&user_id).cloned())
  }
}
