use std::future::Future;

use serde_json::{Map, Value};
use tracing::info;
use usersync_database::{UserRole, UsersRepository, with_connection};
use usersync_result::{ErrorType, InternalError};

use super::SyncWorkerController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// role is not synced, the CRM was not called
  Skipped,
  Created,
  Updated,
}

impl SyncOutcome {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncOutcome::Skipped => "skipped",
      SyncOutcome::Created => "created",
      SyncOutcome::Updated => "updated",
    }
  }
}

/// Positive integer id, either a JSON number or a string of digits
pub fn parse_user_id(payload: &Map<String, Value>) -> Result<u64, InternalError> {
  let invalid = |msg: String| {
    let path = "sync-worker.controller.users_sync.parse_user_id";
    InternalError::plain(path, ErrorType::InvalidPayload, msg)
  };

  let raw = payload.get("id").ok_or_else(|| invalid("payload carries no user id".to_string()))?;
  let id = match raw {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => {
      let digits = s.trim();
      let all_digits = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
      if all_digits { digits.parse::<u64>().ok() } else { None }
    }
    other => {
      return Err(invalid(format!("user id must be a number or a string, got {}", other)));
    }
  };

  match id {
    Some(id) if id > 0 => Ok(id),
    _ => Err(invalid(format!("user id {} is not a positive integer", raw))),
  }
}

impl SyncWorkerController {
  /// Pushes one user into the CRM, shared by `users.created` and `users.updated`.
  /// The database connection is released whatever the outcome.
  pub async fn sync_user(
    &self,
    payload: &Map<String, Value>,
  ) -> Result<SyncOutcome, InternalError> {
    let user_id = parse_user_id(payload)?;
    with_connection(self.sql_db.clone(), || self.push_user(user_id)).await
  }

  async fn push_user(&self, user_id: u64) -> Result<SyncOutcome, InternalError> {
    let user = self.sql_db.users_get_by_id(user_id).await?.ok_or_else(|| {
      let path = "sync-worker.controller.users_sync.push_user";
      InternalError::plain(path, ErrorType::UserNotFound, format!("no user with id {}", user_id))
    })?;

    if !self.role_allowed(user.role) {
      info!(user_id, role = %user.role, "Skipping user, role is not synced");
      return Ok(SyncOutcome::Skipped);
    }

    let existing = self.observe("get_recipient", self.crm.get_recipient(&user.email)).await?;
    match existing {
      Some(_) => {
        self.observe("update_recipient", self.crm.update_recipient(&user)).await?;
        Ok(SyncOutcome::Updated)
      }
      None => {
        self.observe("create_recipient", self.crm.create_recipient(&user)).await?;
        Ok(SyncOutcome::Created)
      }
    }
  }

  fn role_allowed(&self, role: UserRole) -> bool {
    let roles = &self.config.sync.allowed_roles;
    roles.iter().any(|allowed| allowed.eq_ignore_ascii_case(role.as_str()))
  }

  async fn observe<T>(
    &self,
    operation: &str,
    call: impl Future<Output = Result<T, InternalError>>,
  ) -> Result<T, InternalError> {
    let result = call.await;
    self.metrics.record_crm_request(operation, result.is_ok());
    result
  }
}
