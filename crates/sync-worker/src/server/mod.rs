use std::sync::Arc;

use hyper::{Request, body::Incoming, server::conn::http1::Builder, service::service_fn};
use hyper_util::rt::tokio::TokioIo;
use serde_json::json;
use tokio::{net::TcpListener, select, spawn};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};
use usersync_config::{RuntimeConfig, Settings, config};
use usersync_crm::AgillicClient;
use usersync_database::DatabaseInfoSql;
use usersync_result::{BoxedErr, ErrorType, InternalError};

use crate::{
  controller::{SyncWorkerController, SyncWorkerControllerArgs},
  models::pubsub::{PubSubEvent, PubSubMessage},
  server::observability::MetricsCollector,
};

pub mod observability;
pub mod push;

pub struct SyncWorkerServer {
  pub(super) config: Arc<Settings>,
  pub(super) controller: Arc<SyncWorkerController>,
}

impl SyncWorkerServer {
  pub async fn new() -> Result<SyncWorkerServer, BoxedErr> {
    SyncWorkerServer::setup_logging();
    let config = config().await;
    config.preflight_checks();
    SyncWorkerServer::build(Arc::new(config))
  }

  /// Wires the runtime config, database, CRM client and metrics from `config`
  pub fn build(config: Arc<Settings>) -> Result<SyncWorkerServer, BoxedErr> {
    let ie = |err: BoxedErr, msg: &str| {
      let path = "sync-worker.server.build";
      InternalError::new(path, err, ErrorType::InternalError, false, msg)
    };

    let metrics = MetricsCollector::new()?;
    let runtime_config = Arc::new(RuntimeConfig::new(config.variable_source()?));

    let sql_db = DatabaseInfoSql::MySql {
      config: runtime_config.clone(),
      timeout: config.timeouts.database(),
    }
    .build();

    let http_client = reqwest::Client::builder()
      .timeout(config.timeouts.crm()) // Don't hang forever
      .connect_timeout(config.timeouts.connect())
      .pool_max_idle_per_host(2)
      .build()
      .map_err(|err| ie(Box::new(err), "failed to create reqwest client for the CRM"))?;
    let window = std::time::Duration::from_secs(config.sync.token_expiry_window_secs);
    let crm = AgillicClient::new(http_client, runtime_config.clone(), window);

    let controller = SyncWorkerController::new(SyncWorkerControllerArgs {
      config: config.clone(),
      runtime_config,
      sql_db: Arc::new(sql_db),
      crm: Arc::new(crm),
      metrics: Arc::new(metrics),
    });

    Ok(SyncWorkerServer { config, controller: Arc::new(controller) })
  }

  /// Serve Pub/Sub push deliveries until Ctrl+C
  pub async fn run(&self) -> Result<(), BoxedErr> {
    // Loading up front surfaces a broken setup at boot, deliveries retry it anyway
    if let Err(err) = self.controller.runtime_config().ensure_loaded().await {
      warn!("Runtime configuration not loaded at start-up: {}", err);
    }

    let listener = TcpListener::bind(&self.config.server.listen).await?;
    let addr = listener.local_addr()?;
    info!("Sync worker listening on {}", addr);

    let shutdown = self.controller.shutdown_listener();

    loop {
      let (socket, _) = select! {
        accepted = listener.accept() => accepted?,
        _ = shutdown.notified() => break,
      };
      let io = TokioIo::new(socket);
      let controller = self.controller.clone();

      spawn(async move {
        let svc = service_fn(move |req: Request<Incoming>| push::handle(req, controller.clone()));
        if let Err(err) = Builder::new().serve_connection(io, svc).await {
          error!("Error serving push request: {}", err);
        }
      });
    }

    self.controller.drain().await;
    Ok(())
  }

  /// Manual entry point: dispatch one synthetic event and return
  pub async fn run_once(&self, name: &str, id: &str) -> Result<(), BoxedErr> {
    let event = PubSubEvent {
      name: name.to_string(),
      payload: json!({ "id": id }).as_object().cloned().unwrap_or_default(),
    };
    let message = PubSubMessage::from_event(&event)?;

    info!(event = name, id, "Dispatching a test event");
    self.controller.dispatch(&message).await?;
    Ok(())
  }

  fn setup_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber =
      tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer());
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
      eprintln!("Failed to set tracing subscriber: {}", err);
    }
  }
}
