use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use usersync_config::{RuntimeConfig, Settings};
use usersync_crm::CrmClient;
use usersync_database::DatabaseSql;

use crate::server::observability::MetricsCollector;

pub mod dispatcher;
pub mod shutdown;
pub mod users_sync;

pub use dispatcher::*;
pub use users_sync::*;

pub struct SyncWorkerControllerArgs {
  pub config: Arc<Settings>,
  pub runtime_config: Arc<RuntimeConfig>,
  pub sql_db: Arc<DatabaseSql>,
  pub crm: Arc<dyn CrmClient>,
  pub metrics: Arc<MetricsCollector>,
}

/// Long lived context shared by every dispatch of the process
pub struct SyncWorkerController {
  pub(super) config: Arc<Settings>,
  pub(super) runtime_config: Arc<RuntimeConfig>,
  pub(super) sql_db: Arc<DatabaseSql>,
  pub(super) crm: Arc<dyn CrmClient>,
  pub(super) metrics: Arc<MetricsCollector>,
  /// one event in flight per process
  pub(super) in_flight: Semaphore,
  pub(super) shutdown_notify: Arc<Notify>,
}

impl SyncWorkerController {
  pub fn new(args: SyncWorkerControllerArgs) -> SyncWorkerController {
    SyncWorkerController {
      config: args.config,
      runtime_config: args.runtime_config,
      sql_db: args.sql_db,
      crm: args.crm,
      metrics: args.metrics,
      in_flight: Semaphore::new(1),
      shutdown_notify: Arc::new(Notify::new()),
    }
  }

  pub fn runtime_config(&self) -> &Arc<RuntimeConfig> {
    &self.runtime_config
  }

  pub fn metrics(&self) -> &Arc<MetricsCollector> {
    &self.metrics
  }
}
