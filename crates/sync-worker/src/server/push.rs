use std::{convert::Infallible, error::Error, sync::Arc};

use http_body_util::{BodyExt, Full, Limited};
use hyper::{
  Method, Request, Response, StatusCode,
  body::{Body, Bytes},
  header::{CONTENT_TYPE, HeaderValue},
};
use tracing::{error, warn};
use usersync_result::{ErrorType, InternalError};

use crate::{controller::SyncWorkerController, models::pubsub::PushRequest};

/// Push bodies are a few hundred bytes, anything past this is rejected
const MAX_BODY_BYTES: usize = 1024 * 1024;

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
  let mut resp = Response::new(Full::new(body.into()));
  *resp.status_mut() = status;
  resp
}

/// Status replied to Pub/Sub, anything but 2xx makes it redeliver.
/// Messages that can never be handled are acknowledged so they are not redelivered forever.
pub fn status_for(err: &InternalError) -> StatusCode {
  match err.err_type {
    ErrorType::Decode | ErrorType::UnsupportedEvent | ErrorType::InvalidPayload => {
      StatusCode::NO_CONTENT
    }
    _ if err.temp => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

/// Routes one request of the push endpoint
pub async fn handle<B>(
  req: Request<B>,
  controller: Arc<SyncWorkerController>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
  B: Body + Send + Unpin,
  B::Error: Error + Send + Sync + 'static,
{
  match (req.method(), req.uri().path()) {
    (&Method::POST, "/") | (&Method::POST, "/pubsub/push") => Ok(push(req, controller).await),
    (&Method::GET, "/health") => Ok(reply(StatusCode::OK, Bytes::from_static(b"OK"))),
    (&Method::GET, "/metrics") => {
      let mut resp = reply(StatusCode::OK, controller.metrics().render());
      resp
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"));
      Ok(resp)
    }
    _ => Ok(reply(StatusCode::NOT_FOUND, Bytes::from_static(b"Not Found"))),
  }
}

async fn push<B>(req: Request<B>, controller: Arc<SyncWorkerController>) -> Response<Full<Bytes>>
where
  B: Body + Send + Unpin,
  B::Error: Error + Send + Sync + 'static,
{
  let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
    Ok(collected) => collected.to_bytes(),
    Err(err) => {
      warn!("Failed to read push body: {}", err);
      return reply(StatusCode::BAD_REQUEST, "unreadable body");
    }
  };

  let push: PushRequest = match serde_json::from_slice(&body) {
    Ok(push) => push,
    Err(err) => {
      warn!("Rejecting malformed push request: {}", err);
      return reply(StatusCode::BAD_REQUEST, format!("malformed push request: {}", err));
    }
  };

  match controller.dispatch(&push.message).await {
    Ok(()) => reply(StatusCode::NO_CONTENT, Bytes::new()),
    Err(err) if status_for(&err).is_success() => {
      warn!(
        message_id = push.message.message_id.as_deref().unwrap_or_default(),
        "Dropping a message that can never be handled: {}", err
      );
      reply(StatusCode::NO_CONTENT, Bytes::new())
    }
    Err(err) => {
      let status = status_for(&err);
      error!(
        message_id = push.message.message_id.as_deref().unwrap_or_default(),
        subscription = push.subscription.as_deref().unwrap_or_default(),
        %status,
        "Dispatch failed: {}", err
      );
      reply(status, err.msg)
    }
  }
}
