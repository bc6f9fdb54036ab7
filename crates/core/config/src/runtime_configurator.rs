use std::io::{Error, ErrorKind};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use usersync_result::{BoxedErr, ErrorType, InternalError};

use crate::{RuntimeConfigSettings, VariableList, VariableSource};

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");

#[derive(Debug, Deserialize)]
struct MetadataToken {
  access_token: String,
}

/// Google Runtime Configurator client.
///
/// Authenticates with the service account of the host through the metadata
/// server unless a static project id / token is configured.
#[derive(Debug, Clone)]
pub struct RuntimeConfigurator {
  http: Client,
  api_base: String,
  metadata_host: String,
  config_name: String,
  project_id: Option<String>,
  access_token: Option<String>,
}

impl RuntimeConfigurator {
  pub fn new(settings: &RuntimeConfigSettings, http: Client) -> Self {
    Self {
      http,
      api_base: settings.api_base.trim_end_matches('/').to_string(),
      metadata_host: settings.metadata_host.trim_end_matches('/').to_string(),
      config_name: settings.config_name.clone(),
      project_id: settings.project_id.clone(),
      access_token: settings.access_token.clone(),
    }
  }

  async fn metadata(&self, resource: &str) -> Result<reqwest::Response, InternalError> {
    let ie = |err: BoxedErr, msg: &str| {
      let path = "config.runtime_configurator.metadata";
      InternalError::new(path, err, ErrorType::ConfigFetch, true, msg)
    };

    let url = format!("{}/computeMetadata/v1/{}", self.metadata_host, resource);
    let resp = self
      .http
      .get(&url)
      .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
      .send()
      .await
      .map_err(|err| {
        error!(%url, "metadata request failed: {:?}", err);
        ie(Box::new(err), "failed to reach the metadata server")
      })?;

    let status = resp.status();
    if !status.is_success() {
      let err = Box::new(Error::new(ErrorKind::Other, "http_response_error"));
      return Err(ie(err, &format!("metadata server replied {} for {}", status, resource)));
    }
    Ok(resp)
  }

  async fn project_id(&self) -> Result<String, InternalError> {
    if let Some(id) = &self.project_id {
      return Ok(id.clone());
    }

    let resp = self.metadata("project/project-id").await?;
    let id = resp.text().await.map_err(|err| {
      let path = "config.runtime_configurator.project_id";
      InternalError::new(path, Box::new(err), ErrorType::ConfigFetch, true, "unreadable project id")
    })?;
    Ok(id.trim().to_string())
  }

  async fn access_token(&self) -> Result<String, InternalError> {
    if let Some(token) = &self.access_token {
      return Ok(token.clone());
    }

    let resp = self.metadata("instance/service-account/default/token").await?;
    let token: MetadataToken = resp.json().await.map_err(|err| {
      let path = "config.runtime_configurator.access_token";
      let msg = "failed to parse the metadata token reply";
      InternalError::new(path, Box::new(err), ErrorType::ConfigFetch, false, msg)
    })?;
    Ok(token.access_token)
  }
}

#[async_trait]
impl VariableSource for RuntimeConfigurator {
  async fn list_variables(&self) -> Result<VariableList, InternalError> {
    let ie = |err: BoxedErr, err_type: ErrorType, msg: &str| {
      let path = "config.runtime_configurator.list_variables";
      InternalError::new(path, err, err_type, false, msg)
    };

    let project_id = self.project_id().await?;
    let token = self.access_token().await?;
    let parent = format!("projects/{}/configs/{}", project_id, self.config_name);
    let url = format!("{}/{}/variables", self.api_base, parent);

    debug!(%url, "listing runtime configuration variables");
    let resp = self
      .http
      .get(&url)
      .query(&[("returnValues", "true")])
      .bearer_auth(token)
      .send()
      .await
      .map_err(|err| {
        let msg = "unable to fetch configuration from Runtime Configurator";
        ie(Box::new(err), ErrorType::ConfigFetch, msg).temporary()
      })?;

    let status = resp.status();
    if !status.is_success() {
      let txt = resp.text().await.unwrap_or_default();
      let err = Box::new(Error::new(ErrorKind::Other, "http_response_error"));
      let msg = format!(
        "unable to fetch configuration from Runtime Configurator, reply: {} {}",
        status, txt
      );
      let err = ie(err, ErrorType::ConfigFetch, &msg);
      return Err(if status.is_server_error() { err.temporary() } else { err });
    }

    let body: Value = resp.json().await.map_err(|err| {
      let msg = "received reply from Runtime Configurator, but it is not JSON";
      ie(Box::new(err), ErrorType::ConfigFormat, msg)
    })?;

    Ok(VariableList { parent, body })
  }
}
