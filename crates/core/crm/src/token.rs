use std::{
  fmt,
  io::{Error, ErrorKind},
  sync::Arc,
  time::{Duration, Instant},
};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use usersync_result::{BoxedErr, ErrorType, InternalError};

pub const TOKEN_PATH: &str = "/oauth2/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in: Option<u64>,
}

/// Bearer credential handed out by the token endpoint
#[derive(Clone)]
pub struct AccessToken {
  pub access_token: String,
  pub refresh_token: Option<String>,
  /// `None` when the endpoint did not announce a lifetime
  pub expires_at: Option<Instant>,
}

impl fmt::Debug for AccessToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AccessToken")
      .field("access_token", &"[REDACTED]")
      .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
      .field("expires_at", &self.expires_at)
      .finish()
  }
}

impl AccessToken {
  fn from_response(resp: TokenResponse) -> Self {
    let expires_at = resp.expires_in.map(|secs| Instant::now() + Duration::from_secs(secs));
    Self { access_token: resp.access_token, refresh_token: resp.refresh_token, expires_at }
  }

  /// Expired, or expiring within `window`
  pub fn expired(&self, window: Duration) -> bool {
    match self.expires_at {
      Some(at) => Instant::now() + window >= at,
      None => false,
    }
  }
}

/// OAuth2 client-credentials token, shared by every CRM call of the process.
///
/// The lock is held for the whole exchange so concurrent callers wait for the
/// in-flight request instead of starting their own.
#[derive(Debug)]
pub struct TokenCache {
  http: Client,
  window: Duration,
  token: Mutex<Option<Arc<AccessToken>>>,
}

impl TokenCache {
  pub fn new(http: Client, window: Duration) -> Self {
    Self { http, window, token: Mutex::new(None) }
  }

  pub async fn get_access_token(
    &self,
    token_host: &str,
    id: &str,
    secret: &str,
  ) -> Result<Arc<AccessToken>, InternalError> {
    let mut guard = self.token.lock().await;

    let fresh = match guard.as_ref() {
      Some(token) if !token.expired(self.window) => return Ok(token.clone()),
      Some(token) => match &token.refresh_token {
        Some(refresh) => {
          debug!("Access token expired, refreshing it");
          let form = [("grant_type", "refresh_token"), ("refresh_token", refresh.as_str())];
          self.exchange(token_host, id, secret, &form).await
        }
        None => {
          debug!("Access token expired without a refresh token, requesting a new one");
          self.exchange(token_host, id, secret, &[("grant_type", "client_credentials")]).await
        }
      },
      None => self.exchange(token_host, id, secret, &[("grant_type", "client_credentials")]).await,
    };

    match fresh {
      Ok(token) => {
        let token = Arc::new(token);
        *guard = Some(token.clone());
        Ok(token)
      }
      Err(err) => {
        if guard.take().is_some() {
          warn!("Dropped the cached access token after a failed renewal");
        }
        Err(err)
      }
    }
  }

  async fn exchange(
    &self,
    token_host: &str,
    id: &str,
    secret: &str,
    form: &[(&str, &str)],
  ) -> Result<AccessToken, InternalError> {
    let ie = |err: BoxedErr, msg: &str| {
      let path = "crm.token.exchange";
      let msg = format!("Request: POST {}, error: {}", TOKEN_PATH, msg);
      InternalError::new(path, err, ErrorType::CrmRequest, false, msg)
    };

    let url = format!("{}{}", token_host.trim_end_matches('/'), TOKEN_PATH);
    let resp = self
      .http
      .post(&url)
      .basic_auth(id, Some(secret))
      .form(form)
      .send()
      .await
      .map_err(|err| ie(Box::new(err), "failed to reach the token endpoint").temporary())?;

    let status = resp.status();
    if !status.is_success() {
      let txt = resp.text().await.unwrap_or_default();
      let err = Box::new(Error::new(ErrorKind::Other, "http_response_error"));
      let err = ie(err, &format!("token endpoint returned: status={}, body={}", status, txt));
      return Err(if status.is_server_error() { err.temporary() } else { err });
    }

    let token: TokenResponse =
      resp.json().await.map_err(|err| ie(Box::new(err), "failed to parse the token response"))?;

    info!("Obtained a CRM access token");
    Ok(AccessToken::from_response(token))
  }
}
