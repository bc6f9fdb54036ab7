use std::{sync::Arc, time::Duration};

pub use self::reference_sql::*;

mod reference_sql;

#[cfg(feature = "mysql")]
pub use self::mysql::*;
#[cfg(feature = "mysql")]
mod mysql;

use usersync_config::RuntimeConfig;

/// Database information to use to create a client
pub enum DatabaseInfoSql {
  /// Use the in-memory reference database
  Reference,
  /// Connect to MySQL, parameters are resolved from the runtime config on connect
  #[cfg(feature = "mysql")]
  MySql { config: Arc<RuntimeConfig>, timeout: Duration },
}

/// Database
#[derive(Debug)]
pub enum DatabaseSql {
  /// Mock database
  Reference(ReferenceSqlDb),
  /// MySQL database
  #[cfg(feature = "mysql")]
  MySql(MySqlDb),
}

impl DatabaseInfoSql {
  /// Create a database client from the given database information.
  /// No connection is opened until the repository is asked to `connect()`.
  pub fn build(self) -> DatabaseSql {
    match self {
      DatabaseInfoSql::Reference => DatabaseSql::Reference(Default::default()),
      #[cfg(feature = "mysql")]
      DatabaseInfoSql::MySql { config, timeout } => DatabaseSql::MySql(MySqlDb::new(config, timeout)),
    }
  }
}
