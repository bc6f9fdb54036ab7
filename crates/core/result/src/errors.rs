use std::{
  error::Error,
  fmt,
  io::{Error as IoError, ErrorKind},
};

use derive_more::Display;

pub type BoxedErr = Box<dyn Error + Sync + Send>;
pub type OptionalErr = Option<BoxedErr>;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ErrorType {
  // Configuration
  #[display("Unable to fetch configuration")]
  ConfigFetch,
  #[display("Malformed configuration reply")]
  ConfigFormat,
  #[display("Configuration error")]
  Configuration,

  // Database
  #[display("Not connected to a database")]
  NotConnected,
  #[display("Database error")]
  DatabaseError,

  // Events
  #[display("Malformed event envelope")]
  Decode,
  #[display("Unsupported event type")]
  UnsupportedEvent,
  #[display("Invalid event payload")]
  InvalidPayload,
  #[display("User not found")]
  UserNotFound,

  // CRM
  #[display("Missing CRM credentials")]
  MissingCredentials,
  #[display("CRM request error")]
  CrmRequest,

  // Generic
  #[display("Operation timed out")]
  TimedOut,
  #[display("Internal error")]
  InternalError,
}

impl ErrorType {
  /// Short tag used as the innermost error when there is no underlying cause
  pub fn tag(&self) -> &'static str {
    match self {
      ErrorType::ConfigFetch => "config_fetch",
      ErrorType::ConfigFormat => "config_format",
      ErrorType::Configuration => "configuration",
      ErrorType::NotConnected => "not_connected",
      ErrorType::DatabaseError => "database_error",
      ErrorType::Decode => "decode",
      ErrorType::UnsupportedEvent => "unsupported_event",
      ErrorType::InvalidPayload => "invalid_payload",
      ErrorType::UserNotFound => "user_not_found",
      ErrorType::MissingCredentials => "missing_credentials",
      ErrorType::CrmRequest => "crm_request",
      ErrorType::TimedOut => "timed_out",
      ErrorType::InternalError => "internal_error",
    }
  }
}

/// Error raised by the database layer
#[derive(Debug)]
pub struct DBError {
  pub err_type: ErrorType,
  pub err: BoxedErr,
  pub msg: String,
  pub path: String,
}

impl Default for DBError {
  fn default() -> Self {
    Self {
      err_type: ErrorType::DatabaseError,
      err: Box::new(IoError::new(ErrorKind::Other, "Database error")),
      msg: String::new(),
      path: String::new(),
    }
  }
}

impl fmt::Display for DBError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts = Vec::new();

    if !self.path.is_empty() {
      parts.push(format!("path: {}", self.path));
    }
    parts.push(format!("err_type: {}", self.err_type));
    if !self.msg.is_empty() {
      parts.push(format!("msg: {}", self.msg));
    }
    parts.push(format!("err: {}", self.err));

    write!(f, "{}", parts.join(", "))
  }
}

impl Error for DBError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(self.err.as_ref())
  }
}

impl DBError {
  pub fn new(
    path: impl Into<String>,
    err: BoxedErr,
    err_type: ErrorType,
    msg: impl Into<String>,
  ) -> Self {
    Self { err_type, err, msg: msg.into(), path: path.into() }
  }
}

/// The error type shared by every component of the sync worker.
///
/// `temp` marks failures that may succeed when retried later (timeouts,
/// unreachable remotes); everything else is permanent for the given input.
#[derive(Debug, thiserror::Error)]
#[error("path: {path}, err_type: {err_type}, msg: {msg}, err: {err}")]
pub struct InternalError {
  pub err_type: ErrorType,
  pub temp: bool,
  #[source]
  pub err: BoxedErr,
  pub msg: String,
  pub path: String,
}

impl InternalError {
  pub fn new(
    path: impl Into<String>,
    err: BoxedErr,
    err_type: ErrorType,
    temp: bool,
    msg: impl Into<String>,
  ) -> Self {
    Self { err_type, temp, err, msg: msg.into(), path: path.into() }
  }

  /// Builds an error with no underlying cause
  pub fn plain(path: impl Into<String>, err_type: ErrorType, msg: impl Into<String>) -> Self {
    let err = Box::new(IoError::new(ErrorKind::Other, err_type.tag()));
    Self { err_type, temp: false, err, msg: msg.into(), path: path.into() }
  }

  pub fn temporary(mut self) -> Self {
    self.temp = true;
    self
  }

  pub fn is(&self, err_type: &ErrorType) -> bool {
    &self.err_type == err_type
  }
}

impl From<DBError> for InternalError {
  fn from(value: DBError) -> Self {
    let temp = matches!(value.err_type, ErrorType::TimedOut);
    InternalError { err_type: value.err_type, temp, err: value.err, msg: value.msg, path: value.path }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plain_error_display_includes_path_and_type() {
    let err = InternalError::plain("worker.dispatcher", ErrorType::UnsupportedEvent, "users.deleted");
    let s = err.to_string();
    assert!(s.contains("path: worker.dispatcher"));
    assert!(s.contains("err_type: Unsupported event type"));
    assert!(s.contains("msg: users.deleted"));
    assert!(s.contains("err: unsupported_event"));
    assert!(!err.temp);
  }

  #[test]
  fn test_db_error_converts_and_keeps_type() {
    let db = DBError {
      err_type: ErrorType::NotConnected,
      msg: "not connected".into(),
      path: "database.users".into(),
      ..Default::default()
    };
    let err: InternalError = db.into();
    assert!(err.is(&ErrorType::NotConnected));
    assert_eq!(err.path, "database.users");
    assert!(!err.temp);
  }

  #[test]
  fn test_db_timeout_is_temporary() {
    let db = DBError { err_type: ErrorType::TimedOut, ..Default::default() };
    let err: InternalError = db.into();
    assert!(err.temp);
  }

  #[test]
  fn test_source_is_exposed() {
    let err = InternalError::new(
      "crm.client",
      Box::new(IoError::new(ErrorKind::ConnectionRefused, "refused")),
      ErrorType::CrmRequest,
      true,
      "Request: GET /recipients/a@x.com",
    );
    let source = err.source().map(|e| e.to_string());
    assert_eq!(source.as_deref(), Some("refused"));
  }
}
