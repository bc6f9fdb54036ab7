use std::collections::HashMap;

use base64::engine::{Engine as _, general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PUBSUB_MESSAGE_TYPE: &str = "type.googleapis.com/google.pubsub.v1.PubsubMessage";

/// Envelope as delivered by Pub/Sub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PubSubMessage {
  #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
  pub type_url: Option<String>,
  #[serde(default)]
  pub attributes: HashMap<String, String>,
  /// base64 of the JSON encoded [`PubSubEvent`]
  #[serde(default)]
  pub data: String,
  #[serde(rename = "messageId", alias = "message_id", default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message_id: Option<String>,
  #[serde(rename = "publishTime", alias = "publish_time", default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub publish_time: Option<DateTime<Utc>>,
}

impl PubSubMessage {
  /// Wraps an event the way a publisher would
  pub fn from_event(event: &PubSubEvent) -> Result<Self, serde_json::Error> {
    let json = serde_json::to_vec(event)?;
    Ok(PubSubMessage {
      type_url: Some(PUBSUB_MESSAGE_TYPE.to_string()),
      data: general_purpose::STANDARD.encode(json),
      ..Default::default()
    })
  }
}

/// Body of a push subscription request
#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
  pub message: PubSubMessage,
  #[serde(default)]
  pub subscription: Option<String>,
}

/// Decoded envelope content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubEvent {
  pub name: String,
  #[serde(default)]
  pub payload: Map<String, Value>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_push_request_shape() {
    let body = json!({
      "message": {
        "attributes": { "origin": "sam" },
        "data": "eyJuYW1lIjoidXNlcnMuY3JlYXRlZCJ9",
        "messageId": "2070443601311540",
        "publishTime": "2021-02-26T19:13:55.749Z"
      },
      "subscription": "projects/sam/subscriptions/usersync"
    });

    let push: PushRequest = serde_json::from_value(body).unwrap();
    assert_eq!(push.message.message_id.as_deref(), Some("2070443601311540"));
    assert_eq!(push.message.attributes.get("origin").map(String::as_str), Some("sam"));
    assert!(push.message.publish_time.is_some());
    assert_eq!(push.subscription.as_deref(), Some("projects/sam/subscriptions/usersync"));
  }

  #[test]
  fn test_from_event_encodes_json() {
    let event = PubSubEvent {
      name: "users.created".into(),
      payload: json!({ "id": "542" }).as_object().cloned().unwrap(),
    };
    let message = PubSubMessage::from_event(&event).unwrap();
    let raw = general_purpose::STANDARD.decode(message.data).unwrap();
    let back: PubSubEvent = serde_json::from_slice(&raw).unwrap();
    assert_eq!(back, event);
    assert_eq!(message.type_url.as_deref(), Some(PUBSUB_MESSAGE_TYPE));
  }
}
