use std::sync::Arc;

use tokio::{signal::ctrl_c, spawn, sync::Notify};
use tracing::{error, info};

use super::SyncWorkerController;

impl SyncWorkerController {
  /// Start listening for the shutdown signal (Ctrl+C).
  /// The returned notify fires once, the event in flight is allowed to finish.
  pub fn shutdown_listener(&self) -> Arc<Notify> {
    let shutdown_notify = self.shutdown_notify.clone();

    spawn(async move {
      if let Err(err) = ctrl_c().await {
        error!("Error waiting for ctrl_c: {}", err);
        return;
      }

      info!("Shutdown signal received (Ctrl+C). No new deliveries are accepted.");
      // stores a permit when nobody is waiting yet
      shutdown_notify.notify_one();
    });

    self.shutdown_notify.clone()
  }

  /// Waits for the event currently being handled, if any
  pub async fn drain(&self) {
    match self.in_flight.acquire().await {
      Ok(_permit) => info!("No event in flight, shutting down"),
      Err(err) => error!("Dispatch semaphore closed while draining: {}", err),
    }
  }
}
