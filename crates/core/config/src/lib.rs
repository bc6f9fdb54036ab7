use std::{collections::HashMap, env, fs, sync::Arc, time::Duration};

use cached::proc_macro::cached;
use futures_locks::RwLock;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::{info, warn};
use usersync_result::{ErrorType, InternalError};

mod runtime;
mod runtime_configurator;

pub use runtime::*;
pub use runtime_configurator::*;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RuntimeConfigSettings {
  /// Name of the Runtime Configurator config holding this worker's variables
  pub config_name: String,
  /// Falls back to the metadata server when unset
  pub project_id: Option<String>,
  pub api_base: String,
  pub metadata_host: String,
  /// Static bearer token for local runs, the metadata server is used otherwise
  pub access_token: Option<String>,
  /// When non-empty these variables are served instead of the remote config
  pub local_variables: HashMap<String, String>,
}

impl Default for RuntimeConfigSettings {
  fn default() -> Self {
    Self {
      config_name: "SAM-usersync-cf".to_string(),
      project_id: None,
      api_base: "https://runtimeconfig.googleapis.com/v1beta1".to_string(),
      metadata_host: "http://metadata.google.internal".to_string(),
      access_token: None,
      local_variables: HashMap::new(),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Server {
  pub listen: String,
}

impl Default for Server {
  fn default() -> Self {
    Self { listen: "0.0.0.0:8080".to_string() }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Timeouts {
  pub connect_secs: u64,
  pub config_secs: u64,
  pub database_secs: u64,
  pub crm_secs: u64,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self { connect_secs: 3, config_secs: 10, database_secs: 10, crm_secs: 15 }
  }
}

impl Timeouts {
  pub fn connect(&self) -> Duration {
    Duration::from_secs(self.connect_secs)
  }

  pub fn config(&self) -> Duration {
    Duration::from_secs(self.config_secs)
  }

  pub fn database(&self) -> Duration {
    Duration::from_secs(self.database_secs)
  }

  pub fn crm(&self) -> Duration {
    Duration::from_secs(self.crm_secs)
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SyncSettings {
  /// Roles that are pushed to the CRM, users with other roles are skipped
  pub allowed_roles: Vec<String>,
  /// Tokens expiring within this window are treated as expired
  pub token_expiry_window_secs: u64,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      allowed_roles: vec!["admin".to_string(), "seller".to_string()],
      token_expiry_window_secs: 10,
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
  pub runtime_config: RuntimeConfigSettings,
  pub server: Server,
  pub timeouts: Timeouts,
  pub sync: SyncSettings,
}

impl Settings {
  pub fn from_yaml_str(content: &str) -> Result<Settings, serde_yaml::Error> {
    serde_yaml::from_str(content)
  }

  pub fn preflight_checks(&self) {
    if !self.runtime_config.local_variables.is_empty() {
      warn!("Serving runtime configuration from local variables, the remote config is ignored.");
    } else if self.runtime_config.project_id.is_none() {
      info!("No project id configured, it will be resolved through the metadata server.");
    }

    if self.sync.allowed_roles.is_empty() {
      warn!("No roles are allowed to sync! Every event will be skipped.");
    }
  }

  /// Picks the variable source for this deployment
  pub fn variable_source(&self) -> Result<Arc<dyn VariableSource>, InternalError> {
    let rc = &self.runtime_config;
    if !rc.local_variables.is_empty() {
      let parent = format!("local/configs/{}", rc.config_name);
      return Ok(Arc::new(StaticVariableSource::new(parent, rc.local_variables.clone())));
    }

    let http = reqwest::Client::builder()
      .timeout(self.timeouts.config())
      .connect_timeout(self.timeouts.connect())
      .build()
      .map_err(|err| {
        let path = "config.variable_source";
        let msg = "failed to create http client for the configuration service";
        InternalError::new(path, Box::new(err), ErrorType::InternalError, false, msg)
      })?;

    Ok(Arc::new(RuntimeConfigurator::new(rc, http)))
  }
}

fn settings_path() -> String {
  match env::var("USERSYNC_CONFIG") {
    Ok(path) => path,
    Err(_) => {
      let env_mode = env::var("ENV").unwrap_or("dev".to_string());
      format!("/usersync.{}.yaml", env_mode)
    }
  }
}

/// Configuration builder
static CONFIG_BUILDER: Lazy<RwLock<Settings>> = Lazy::new(|| {
  RwLock::new({
    let path = settings_path();
    let mut settings = Settings::default();

    if std::path::Path::new(&path).exists() {
      let settings_str = fs::read_to_string(path).expect("Should read config file");
      settings = Settings::from_yaml_str(&settings_str).expect("Should deserialize config file");
    }
    settings
  })
});

pub async fn read() -> Settings {
  CONFIG_BUILDER.read().await.clone()
}

#[cached(time = 300)]
pub async fn config() -> Settings {
  read().await
}
