mod users;

pub use users::*;

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::warn;
use usersync_result::DBError;

use crate::DatabaseSql;

/// A database handle with an explicit connection lifecycle
#[async_trait]
pub trait AbstractDatabaseSql: Sync + Send + UsersRepository {
  /// Open the connection, no-op when one is already open
  async fn connect(&self) -> Result<(), DBError>;
  /// Close the connection, no-op when none is open. Failures are logged, never returned.
  async fn disconnect(&self);
}

impl std::ops::Deref for DatabaseSql {
  type Target = dyn AbstractDatabaseSql;

  fn deref(&self) -> &Self::Target {
    match self {
      DatabaseSql::Reference(dummy) => dummy,
      #[cfg(feature = "mysql")]
      DatabaseSql::MySql(mysql) => mysql,
    }
  }
}

/// Disconnects in the background if the scope is dropped before it finished
struct ConnectionGuard {
  db: Option<Arc<DatabaseSql>>,
}

impl ConnectionGuard {
  fn disarm(&mut self) {
    self.db = None;
  }
}

impl Drop for ConnectionGuard {
  fn drop(&mut self) {
    let Some(db) = self.db.take() else { return };
    match Handle::try_current() {
      Ok(handle) => {
        warn!("Connection scope cancelled, releasing the connection");
        handle.spawn(async move { db.disconnect().await });
      }
      Err(_) => warn!("Connection scope cancelled outside a runtime, connection left open"),
    }
  }
}

/// Runs `work` inside a connection scope: connects first and always
/// disconnects afterwards, whatever `work` returned or if the scope is cancelled.
pub async fn with_connection<F, Fut, T, E>(db: Arc<DatabaseSql>, work: F) -> Result<T, E>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: From<DBError>,
{
  db.connect().await?;
  let mut guard = ConnectionGuard { db: Some(db.clone()) };
  let result = work().await;
  db.disconnect().await;
  guard.disarm();
  result
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tokio::time::{sleep, timeout};
  use usersync_result::{ErrorType, InternalError};

  use super::*;
  use crate::{DatabaseInfoSql, ReferenceSqlDb, UserRole};

  fn user(id: u64) -> UserEssentials {
    UserEssentials {
      id,
      email: format!("user{}@example.com", id),
      name: "Some One".into(),
      phone: "+4511223344".into(),
      company_name: "Acme".into(),
      address: None,
      zip: None,
      city: None,
      country: None,
      cvr: None,
      role: UserRole::Seller,
    }
  }

  #[tokio::test]
  async fn test_lookup_requires_connection() {
    let db = DatabaseInfoSql::Reference.build();
    let err = db.users_get_by_id(1).await.unwrap_err();
    assert_eq!(err.err_type, ErrorType::NotConnected);
  }

  #[tokio::test]
  async fn test_with_connection_disconnects_on_success() {
    let db = Arc::new(DatabaseInfoSql::Reference.build());
    let DatabaseSql::Reference(reference) = &*db else { panic!("reference driver expected") };
    reference.insert_user(user(42)).await;

    let found =
      with_connection(db.clone(), || async { db.users_get_by_id(42).await }).await.unwrap();

    assert_eq!(found.map(|u| u.id), Some(42));
    assert_eq!(reference.connect_count(), 1);
    assert_eq!(reference.disconnect_count(), 1);
    assert!(!reference.is_connected());
  }

  #[tokio::test]
  async fn test_with_connection_disconnects_on_failure() {
    let db = Arc::new(DatabaseInfoSql::Reference.build());
    let DatabaseSql::Reference(reference) = &*db else { panic!("reference driver expected") };

    let result: Result<(), InternalError> = with_connection(db.clone(), || async {
      let user = db.users_get_by_id(7).await?;
      match user {
        Some(_) => Ok(()),
        None => Err(InternalError::plain("test", ErrorType::UserNotFound, "no user #7")),
      }
    })
    .await;

    assert!(result.unwrap_err().is(&ErrorType::UserNotFound));
    assert_eq!(reference.disconnect_count(), 1);
  }

  #[tokio::test]
  async fn test_connect_is_idempotent() {
    let db = ReferenceSqlDb::default();
    db.connect().await.unwrap();
    db.connect().await.unwrap();
    db.disconnect().await;
    db.disconnect().await;
    assert_eq!(db.connect_count(), 1);
    assert_eq!(db.disconnect_count(), 1);
  }

  #[tokio::test]
  async fn test_cancelled_scope_still_disconnects() {
    let db = Arc::new(DatabaseInfoSql::Reference.build());
    let DatabaseSql::Reference(reference) = &*db else { panic!("reference driver expected") };

    let scope = with_connection(db.clone(), || async {
      sleep(Duration::from_secs(5)).await;
      Ok::<(), DBError>(())
    });
    assert!(timeout(Duration::from_millis(50), scope).await.is_err());

    sleep(Duration::from_millis(20)).await;
    assert_eq!(reference.connect_count(), 1);
    assert_eq!(reference.disconnect_count(), 1);
    assert!(!reference.is_connected());
  }
}
