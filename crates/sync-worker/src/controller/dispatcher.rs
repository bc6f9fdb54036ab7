use std::{fmt, str::FromStr};

use base64::engine::{Engine as _, general_purpose};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};
use usersync_result::{BoxedErr, ErrorType, InternalError};

use crate::models::pubsub::{PubSubEvent, PubSubMessage};

use super::SyncWorkerController;

/// Every event this worker handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  UsersCreated,
  UsersUpdated,
}

impl EventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EventKind::UsersCreated => "users.created",
      EventKind::UsersUpdated => "users.updated",
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventKind {
  type Err = InternalError;

  fn from_str(name: &str) -> Result<Self, Self::Err> {
    match name {
      "users.created" => Ok(EventKind::UsersCreated),
      "users.updated" => Ok(EventKind::UsersUpdated),
      other => {
        let path = "sync-worker.controller.dispatcher";
        let msg = format!("no handler for event '{}'", other);
        Err(InternalError::plain(path, ErrorType::UnsupportedEvent, msg))
      }
    }
  }
}

/// base64 -> JSON `{name, payload}`
pub fn decode_event(message: &PubSubMessage) -> Result<PubSubEvent, InternalError> {
  let ie = |err: BoxedErr, msg: &str| {
    let path = "sync-worker.controller.dispatcher.decode_event";
    InternalError::new(path, err, ErrorType::Decode, false, msg)
  };

  let raw = general_purpose::STANDARD
    .decode(message.data.trim().as_bytes())
    .map_err(|err| ie(Box::new(err), "message data is not valid base64"))?;

  serde_json::from_slice::<PubSubEvent>(&raw)
    .map_err(|err| ie(Box::new(err), "message data is not a JSON encoded event"))
}

impl SyncWorkerController {
  /// Handles one delivery.
  ///
  /// Configuration, decode and unsupported event errors are returned. Once a
  /// handler ran its failure is logged and swallowed, the delivery counts as done.
  pub async fn dispatch(&self, message: &PubSubMessage) -> Result<(), InternalError> {
    let _permit = self.in_flight.acquire().await.map_err(|err| {
      let path = "sync-worker.controller.dispatcher.dispatch";
      let msg = "dispatch is closed";
      InternalError::new(path, Box::new(err), ErrorType::InternalError, false, msg)
    })?;

    if let Err(err) = self.runtime_config.ensure_loaded().await {
      self.metrics.record_event("unknown", "config_error");
      return Err(err);
    }

    let event =
      decode_event(message).inspect_err(|_| self.metrics.record_event("unknown", "decode_error"))?;
    let kind = event
      .name
      .parse::<EventKind>()
      .inspect_err(|_| self.metrics.record_event("unknown", "unsupported"))?;

    if let Some(published) = message.publish_time {
      let age = Utc::now().signed_duration_since(published);
      debug!(event = %kind, age_ms = age.num_milliseconds(), "event received");
    }

    let result = match kind {
      EventKind::UsersCreated | EventKind::UsersUpdated => self.sync_user(&event.payload).await,
    };

    match result {
      Ok(outcome) => {
        info!(event = %kind, outcome = outcome.as_str(), "Event handled");
        self.metrics.record_event(kind.as_str(), outcome.as_str());
      }
      Err(err) => {
        let payload = Value::Object(event.payload.clone());
        error!(event = %kind, %payload, "Event handler failed: {}", err);
        self.metrics.record_event(kind.as_str(), "failed");
      }
    }

    Ok(())
  }
}
