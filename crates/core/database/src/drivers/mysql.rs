use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::{Connection, Executor, MySqlConnection, mysql::MySqlConnectOptions};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, error, info};
use usersync_config::RuntimeConfig;
use usersync_result::{DBError, ErrorType};

use crate::{AbstractDatabaseSql, USER_SELECT};

/// MySQL implementation.
///
/// Holds at most one open connection, opened by `connect()` and released by
/// `disconnect()`.
pub struct MySqlDb {
  pub(crate) config: Arc<RuntimeConfig>,
  pub(crate) timeout: Duration,
  pub(crate) conn: Mutex<Option<MySqlConnection>>,
}

impl fmt::Debug for MySqlDb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MySqlDb").field("timeout", &self.timeout).finish()
  }
}

impl MySqlDb {
  pub fn new(config: Arc<RuntimeConfig>, timeout: Duration) -> Self {
    Self { config, timeout, conn: Mutex::new(None) }
  }
}

#[async_trait]
impl AbstractDatabaseSql for MySqlDb {
  async fn connect(&self) -> Result<(), DBError> {
    let path = "database.drivers.mysql.connect".to_string();

    let mut guard = self.conn.lock().await;
    if guard.is_some() {
      return Ok(());
    }

    let target = MySqlTarget::from_runtime_config(&self.config)?;
    debug!(?target, "connecting to MySQL");

    let mut conn = match timeout(self.timeout, MySqlConnection::connect_with(&target.options())).await {
      Ok(Ok(conn)) => conn,
      Ok(Err(err)) => {
        let msg = "failed to connect to MySQL".to_string();
        return Err(DBError { err_type: ErrorType::DatabaseError, msg, path, err: Box::new(err) });
      }
      Err(elapsed) => {
        let msg = format!("connecting to MySQL exceeded {:?}", self.timeout);
        return Err(DBError { err_type: ErrorType::TimedOut, msg, path, err: Box::new(elapsed) });
      }
    };

    // Prepared once here, later executions hit the connection's statement cache
    match timeout(self.timeout, (&mut conn).prepare(USER_SELECT)).await {
      Ok(Ok(_)) => {}
      Ok(Err(err)) => {
        let _ = conn.close().await;
        let msg = "failed to prepare the user select".to_string();
        return Err(DBError { err_type: ErrorType::DatabaseError, msg, path, err: Box::new(err) });
      }
      Err(elapsed) => {
        let msg = format!("preparing the user select exceeded {:?}", self.timeout);
        return Err(DBError { err_type: ErrorType::TimedOut, msg, path, err: Box::new(elapsed) });
      }
    }

    info!("Connected to MySQL");
    *guard = Some(conn);
    Ok(())
  }

  async fn disconnect(&self) {
    let conn = self.conn.lock().await.take();
    let Some(conn) = conn else {
      return;
    };

    if let Err(err) = conn.close().await {
      error!("Failed to close the MySQL connection: {}", err);
    } else {
      debug!("Disconnected from MySQL");
    }
  }
}

/// Where to reach the database, resolved from `database/*` runtime variables
#[derive(Clone, PartialEq)]
pub enum MySqlTarget {
  Socket {
    path: String,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
  },
  Tcp {
    host: String,
    port: Option<u16>,
    user: String,
    password: String,
    database: String,
  },
}

impl fmt::Debug for MySqlTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MySqlTarget::Socket { path, user, database, .. } => f
        .debug_struct("Socket")
        .field("path", path)
        .field("user", user)
        .field("database", database)
        .finish(),
      MySqlTarget::Tcp { host, port, user, database, .. } => f
        .debug_struct("Tcp")
        .field("host", host)
        .field("port", port)
        .field("user", user)
        .field("database", database)
        .finish(),
    }
  }
}

impl MySqlTarget {
  pub fn from_runtime_config(config: &RuntimeConfig) -> Result<Self, DBError> {
    let get = |key: &str| config.get(key).filter(|v| !v.is_empty());

    if let Some(path) = get("database/socket") {
      return Ok(MySqlTarget::Socket {
        path,
        user: get("database/user"),
        password: get("database/password"),
        database: get("database/dbname"),
      });
    }

    match (get("database/hostname"), get("database/user"), get("database/password"), get("database/dbname")) {
      (Some(hostname), Some(user), Some(password), Some(database)) => {
        let (host, port) = split_host_port(&hostname);
        Ok(MySqlTarget::Tcp { host, port, user, password, database })
      }
      _ => Err(DBError {
        err_type: ErrorType::Configuration,
        msg: "missing connection options host, user, password, database name or socket path".into(),
        path: "database.drivers.mysql.from_runtime_config".into(),
        ..Default::default()
      }),
    }
  }

  pub fn options(&self) -> MySqlConnectOptions {
    match self {
      MySqlTarget::Socket { path, user, password, database } => {
        let mut options = MySqlConnectOptions::new().socket(path);
        if let Some(user) = user {
          options = options.username(user);
        }
        if let Some(password) = password {
          options = options.password(password);
        }
        if let Some(database) = database {
          options = options.database(database);
        }
        options
      }
      MySqlTarget::Tcp { host, port, user, password, database } => {
        let mut options = MySqlConnectOptions::new()
          .host(host)
          .username(user)
          .password(password)
          .database(database);
        if let Some(port) = port {
          options = options.port(*port);
        }
        options
      }
    }
  }
}

fn split_host_port(hostname: &str) -> (String, Option<u16>) {
  match hostname.rsplit_once(':') {
    Some((host, port)) => match port.parse::<u16>() {
      Ok(port) => (host.to_string(), Some(port)),
      Err(_) => (hostname.to_string(), None),
    },
    None => (hostname.to_string(), None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn loaded(vars: &[(&str, &str)]) -> RuntimeConfig {
    let rc = RuntimeConfig::from_static(vars.iter().copied());
    rc.load().await.unwrap();
    rc
  }

  #[tokio::test]
  async fn test_socket_wins_over_host() {
    let rc = loaded(&[
      ("database/socket", "/cloudsql/sam:europe-west1:sam"),
      ("database/hostname", "10.0.0.1"),
      ("database/user", "sync"),
    ])
    .await;

    let target = MySqlTarget::from_runtime_config(&rc).unwrap();
    assert_eq!(
      target,
      MySqlTarget::Socket {
        path: "/cloudsql/sam:europe-west1:sam".into(),
        user: Some("sync".into()),
        password: None,
        database: None,
      }
    );
  }

  #[tokio::test]
  async fn test_host_requires_every_field() {
    let rc = loaded(&[("database/hostname", "10.0.0.1"), ("database/user", "sync")]).await;
    let err = MySqlTarget::from_runtime_config(&rc).unwrap_err();
    assert_eq!(err.err_type, ErrorType::Configuration);
  }

  #[tokio::test]
  async fn test_host_with_port() {
    let rc = loaded(&[
      ("database/hostname", "db.internal:3307"),
      ("database/user", "sync"),
      ("database/password", "secret"),
      ("database/dbname", "sam"),
    ])
    .await;

    match MySqlTarget::from_runtime_config(&rc).unwrap() {
      MySqlTarget::Tcp { host, port, .. } => {
        assert_eq!(host, "db.internal");
        assert_eq!(port, Some(3307));
      }
      other => panic!("unexpected target {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_debug_does_not_leak_password() {
    let rc = loaded(&[
      ("database/hostname", "db"),
      ("database/user", "sync"),
      ("database/password", "s3cr3t"),
      ("database/dbname", "sam"),
    ])
    .await;
    let target = MySqlTarget::from_runtime_config(&rc).unwrap();
    assert!(!format!("{:?}", target).contains("s3cr3t"));
  }
}
