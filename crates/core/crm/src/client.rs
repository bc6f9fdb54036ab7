use std::{
  fmt,
  io::{Error, ErrorKind},
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use tracing::{debug, info};
use usersync_config::RuntimeConfig;
use usersync_database::UserEssentials;
use usersync_result::{BoxedErr, ErrorType, InternalError};

use crate::{NewRecipient, PersonBody, PersonData, PersonResult, RecipientUpdate, TokenCache};

const MISSING_CREDENTIALS: &str = "Agillic: unable to retrieve host, client id or secret, \
  please check your Google Runtime Configurator setup";

/// Recipient store of the marketing CRM
#[async_trait]
pub trait CrmClient: Send + Sync {
  /// The recipient stored under `email`, `None` when there is none or its EMAIL differs
  async fn get_recipient(&self, email: &str) -> Result<Option<PersonData>, InternalError>;
  async fn create_recipient(&self, user: &UserEssentials) -> Result<(), InternalError>;
  async fn update_recipient(&self, user: &UserEssentials) -> Result<(), InternalError>;
}

struct Credentials {
  base_url: String,
  client_id: String,
  client_secret: String,
}

/// Agillic REST client, credentials are read from the runtime config on every call
pub struct AgillicClient {
  http: Client,
  config: Arc<RuntimeConfig>,
  tokens: TokenCache,
}

impl fmt::Debug for AgillicClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AgillicClient").field("tokens", &self.tokens).finish()
  }
}

impl AgillicClient {
  /// `http` should carry the CRM timeout, it is shared with the token exchange
  pub fn new(http: Client, config: Arc<RuntimeConfig>, expiry_window: Duration) -> Self {
    let tokens = TokenCache::new(http.clone(), expiry_window);
    Self { http, config, tokens }
  }

  fn credentials(&self) -> Result<Credentials, InternalError> {
    let get = |key: &str| self.config.get(key).filter(|v| !v.is_empty());
    match (get("agillic/base-url"), get("agillic/client-id"), get("agillic/client-secret")) {
      (Some(base_url), Some(client_id), Some(client_secret)) => Ok(Credentials {
        base_url: base_url.trim_end_matches('/').to_string(),
        client_id,
        client_secret,
      }),
      _ => {
        let path = "crm.client.credentials";
        Err(InternalError::plain(path, ErrorType::MissingCredentials, MISSING_CREDENTIALS))
      }
    }
  }

  /// Sends one authenticated request. `None` is returned for a 404 when `absent_ok`.
  async fn send<B: Serialize + Sync>(
    &self,
    method: Method,
    resource: &str,
    body: Option<&B>,
    absent_ok: bool,
  ) -> Result<Option<reqwest::Response>, InternalError> {
    let request = format!("Request: {} {}", method, resource);
    let ie = |err: BoxedErr, msg: String| {
      let msg = format!("{}, error: {}", request, msg);
      InternalError::new("crm.client.send", err, ErrorType::CrmRequest, false, msg)
    };

    let creds = self.credentials()?;
    let token =
      self.tokens.get_access_token(&creds.base_url, &creds.client_id, &creds.client_secret).await?;

    let url = format!("{}{}", creds.base_url, resource);
    let mut req = self.http.request(method.clone(), &url).bearer_auth(&token.access_token);
    if let Some(body) = body {
      req = req.json(body);
    }

    debug!(%method, %resource, "calling the CRM");
    let resp = req.send().await.map_err(|err| {
      let msg = err.to_string();
      ie(Box::new(err), msg).temporary()
    })?;

    let status = resp.status();
    if absent_ok && status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      let txt = resp.text().await.unwrap_or_default();
      let err = Box::new(Error::new(ErrorKind::Other, "http_response_error"));
      let err = ie(err, format!("{} {}", status, txt));
      return Err(if status.is_server_error() { err.temporary() } else { err });
    }

    Ok(Some(resp))
  }
}

fn recipient_path(email: &str) -> String {
  format!("/recipients/{}", urlencoding::encode(email))
}

#[async_trait]
impl CrmClient for AgillicClient {
  async fn get_recipient(&self, email: &str) -> Result<Option<PersonData>, InternalError> {
    let resource = recipient_path(email);
    let Some(resp) = self.send::<()>(Method::GET, &resource, None, true).await? else {
      debug!(%email, "no recipient stored");
      return Ok(None);
    };

    let body = resp.bytes().await.map_err(|err| {
      let msg = format!("Request: GET {}, error: {}", resource, err);
      let path = "crm.client.get_recipient";
      InternalError::new(path, Box::new(err), ErrorType::CrmRequest, true, msg)
    })?;

    // An empty or unparsable reply carries no person data
    match serde_json::from_slice::<PersonResult>(&body) {
      Ok(found) => Ok(found.matching(email)),
      Err(err) => {
        debug!(%email, %err, "recipient lookup returned no person data");
        Ok(None)
      }
    }
  }

  async fn create_recipient(&self, user: &UserEssentials) -> Result<(), InternalError> {
    let body = PersonBody { person_data: NewRecipient::from(user) };
    self.send(Method::POST, "/recipients", Some(&body), false).await?;
    info!(user_id = user.id, "Created CRM recipient");
    Ok(())
  }

  async fn update_recipient(&self, user: &UserEssentials) -> Result<(), InternalError> {
    let body = PersonBody { person_data: RecipientUpdate::from(user) };
    self.send(Method::PUT, &recipient_path(&user.email), Some(&body), false).await?;
    info!(user_id = user.id, "Updated CRM recipient");
    Ok(())
  }
}
