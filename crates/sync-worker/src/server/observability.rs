use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use usersync_result::{BoxedErr, ErrorType, InternalError};

/// Prometheus metrics of the sync worker, served on `/metrics`
#[derive(Clone, Debug)]
pub struct MetricsCollector {
  registry: Registry,
  pub events_total: IntCounterVec,
  pub crm_requests_total: IntCounterVec,
}

impl MetricsCollector {
  pub fn new() -> Result<Self, BoxedErr> {
    let ie = |msg: &str, err: BoxedErr| {
      let path = "sync-worker.server.observability";
      InternalError::new(path, err, ErrorType::InternalError, false, msg)
    };

    let registry = Registry::new();

    let events_total = IntCounterVec::new(
      Opts::new("usersync_events_total", "Dispatched events by event name and outcome"),
      &["event", "outcome"],
    )
    .map_err(|err| ie("failed to create events_total", Box::new(err)))?;
    registry
      .register(Box::new(events_total.clone()))
      .map_err(|err| ie("failed to register events_total", Box::new(err)))?;

    let crm_requests_total = IntCounterVec::new(
      Opts::new("usersync_crm_requests_total", "CRM calls by operation and result"),
      &["operation", "result"],
    )
    .map_err(|err| ie("failed to create crm_requests_total", Box::new(err)))?;
    registry
      .register(Box::new(crm_requests_total.clone()))
      .map_err(|err| ie("failed to register crm_requests_total", Box::new(err)))?;

    Ok(MetricsCollector { registry, events_total, crm_requests_total })
  }

  pub fn record_event(&self, event: &str, outcome: &str) {
    self.events_total.with_label_values(&[event, outcome]).inc();
  }

  pub fn record_crm_request(&self, operation: &str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    self.crm_requests_total.with_label_values(&[operation, result]).inc();
  }

  /// Current values in the Prometheus text format
  pub fn render(&self) -> String {
    TextEncoder::new().encode_to_string(&self.registry.gather()).unwrap_or_default()
  }
}
