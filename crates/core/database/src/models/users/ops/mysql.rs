use async_trait::async_trait;
use tokio::time::timeout;
use usersync_result::{DBError, ErrorType};

use crate::{MySqlDb, USER_SELECT, UserEssentials, UserRow, UsersRepository};

#[async_trait()]
impl UsersRepository for MySqlDb {
  async fn users_get_by_id(&self, user_id: u64) -> Result<Option<UserEssentials>, DBError> {
    let path = "database.users.users_get_by_id".to_string();

    let mut guard = self.conn.lock().await;
    let conn = match guard.as_mut() {
      Some(conn) => conn,
      None => {
        let msg = "not connected to a database".to_string();
        return Err(DBError { err_type: ErrorType::NotConnected, msg, path, ..Default::default() });
      }
    };

    let query = sqlx::query_as::<_, UserRow>(USER_SELECT)
      .bind(user_id)
      .bind(user_id)
      .fetch_optional(&mut *conn);

    match timeout(self.timeout, query).await {
      Ok(Ok(row)) => Ok(row.map(UserEssentials::from)),
      Ok(Err(err)) => Err(DBError {
        err_type: ErrorType::DatabaseError,
        msg: format!("failed to fetch user #{}", user_id),
        path,
        err: Box::new(err),
      }),
      Err(elapsed) => Err(DBError {
        err_type: ErrorType::TimedOut,
        msg: format!("user lookup exceeded {:?}", self.timeout),
        path,
        err: Box::new(elapsed),
      }),
    }
  }
}
