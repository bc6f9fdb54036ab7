use std::{
  collections::{BTreeMap, HashMap},
  fmt,
  sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
  },
};

use async_trait::async_trait;
use base64::engine::{Engine as _, general_purpose};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use usersync_result::{ErrorType, InternalError};

/// Raw reply of a variables listing
#[derive(Debug, Clone)]
pub struct VariableList {
  /// Fully qualified config path, every variable name starts with `{parent}/variables/`
  pub parent: String,
  pub body: Value,
}

/// Backend holding the runtime variables of this deployment
#[async_trait]
pub trait VariableSource: Send + Sync {
  /// Fetch every variable of the config group.
  /// Fails with `ConfigFetch` when the remote does not answer with success.
  async fn list_variables(&self) -> Result<VariableList, InternalError>;
}

#[derive(Debug, Deserialize)]
struct Variable {
  name: Option<String>,
  text: Option<String>,
  /// base64 encoded, set instead of `text` for binary variables
  value: Option<String>,
}

impl Variable {
  fn into_entry(self, prefix: &str) -> Option<(String, String)> {
    let name = self.name.filter(|n| !n.is_empty())?;
    let value = match (self.text, self.value) {
      (Some(text), _) => text,
      (None, Some(encoded)) => {
        let bytes = general_purpose::STANDARD.decode(encoded.as_bytes()).ok()?;
        String::from_utf8(bytes).ok()?
      }
      (None, None) => return None,
    };
    let short = name.strip_prefix(prefix).unwrap_or(&name).to_string();
    Some((short, value))
  }
}

/// Process wide key/value cache of runtime configuration.
///
/// Loaded from a [`VariableSource`], read synchronously afterwards. A reload
/// swaps a fully built map in, readers never observe a partial state.
pub struct RuntimeConfig {
  source: Arc<dyn VariableSource>,
  values: RwLock<Arc<HashMap<String, String>>>,
  loaded: AtomicBool,
  load_lock: Mutex<()>,
}

impl fmt::Debug for RuntimeConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let values = self.snapshot();
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort();
    f.debug_struct("RuntimeConfig")
      .field("loaded", &self.is_loaded())
      .field("keys", &keys)
      .finish()
  }
}

impl RuntimeConfig {
  pub fn new(source: Arc<dyn VariableSource>) -> Self {
    Self {
      source,
      values: RwLock::new(Arc::new(HashMap::new())),
      loaded: AtomicBool::new(false),
      load_lock: Mutex::new(()),
    }
  }

  /// Shortcut for a config served from memory, still needs `load()`
  pub fn from_static<K, V>(variables: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: Into<String>,
    V: Into<String>,
  {
    let variables = variables.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    Self::new(Arc::new(StaticVariableSource::new("static/configs/usersync", variables)))
  }

  /// Fetch all variables and replace the cached mapping
  pub async fn load(&self) -> Result<(), InternalError> {
    let path = "config.runtime.load";
    let list = self.source.list_variables().await?;

    let variables = match list.body.get("variables") {
      Some(Value::Array(vars)) => vars.clone(),
      other => {
        let msg = format!("expected an array of variables, instead got {}", describe(other));
        return Err(InternalError::plain(path, ErrorType::ConfigFormat, msg));
      }
    };

    let prefix = format!("{}/variables/", list.parent);
    let mut map = HashMap::with_capacity(variables.len());
    for raw in variables {
      match serde_json::from_value::<Variable>(raw) {
        Ok(var) => {
          if let Some((key, value)) = var.into_entry(&prefix) {
            map.insert(key, value);
          }
        }
        Err(err) => warn!("Skipping malformed configuration variable: {}", err),
      }
    }

    info!("Loaded {} configuration variables from {}", map.len(), list.parent);
    *self.values.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(map);
    self.loaded.store(true, Ordering::SeqCst);
    Ok(())
  }

  /// Loads once, concurrent first callers wait for the same load
  pub async fn ensure_loaded(&self) -> Result<(), InternalError> {
    if self.is_loaded() {
      return Ok(());
    }
    let _guard = self.load_lock.lock().await;
    if self.is_loaded() {
      debug!("Configuration loaded by a concurrent caller");
      return Ok(());
    }
    self.load().await
  }

  pub fn get(&self, key: &str) -> Option<String> {
    self.values.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded.load(Ordering::SeqCst)
  }

  fn snapshot(&self) -> Arc<HashMap<String, String>> {
    self.values.read().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

fn describe(value: Option<&Value>) -> &'static str {
  match value {
    None | Some(Value::Null) => "nothing",
    Some(Value::Bool(_)) => "a boolean",
    Some(Value::Number(_)) => "a number",
    Some(Value::String(_)) => "a string",
    Some(Value::Array(_)) => "an array",
    Some(Value::Object(_)) => "an object",
  }
}

/// In-memory variable source
#[derive(Debug, Clone)]
pub struct StaticVariableSource {
  parent: String,
  variables: BTreeMap<String, String>,
}

impl StaticVariableSource {
  pub fn new(parent: impl Into<String>, variables: HashMap<String, String>) -> Self {
    Self { parent: parent.into(), variables: variables.into_iter().collect() }
  }
}

#[async_trait]
impl VariableSource for StaticVariableSource {
  async fn list_variables(&self) -> Result<VariableList, InternalError> {
    let variables: Vec<Value> = self
      .variables
      .iter()
      .map(|(k, v)| json!({ "name": format!("{}/variables/{}", self.parent, k), "text": v }))
      .collect();

    Ok(VariableList { parent: self.parent.clone(), body: json!({ "variables": variables }) })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  struct CannedSource {
    body: Value,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl VariableSource for CannedSource {
    async fn list_variables(&self) -> Result<VariableList, InternalError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(VariableList { parent: "projects/p/configs/c".into(), body: self.body.clone() })
    }
  }

  fn canned(body: Value) -> Arc<CannedSource> {
    Arc::new(CannedSource { body, calls: AtomicUsize::new(0) })
  }

  #[tokio::test]
  async fn test_load_strips_prefix_and_skips_incomplete_variables() {
    let source = canned(json!({
      "variables": [
        { "name": "projects/p/configs/c/variables/database/hostname", "text": "db.local" },
        { "name": "projects/p/configs/c/variables/agillic/client-id", "value": "Y2xpZW50" },
        { "name": "projects/p/configs/c/variables/no-value" },
        { "text": "orphan" },
        "garbage"
      ]
    }));
    let rc = RuntimeConfig::new(source);
    assert!(!rc.is_loaded());

    rc.load().await.unwrap();

    assert!(rc.is_loaded());
    assert_eq!(rc.get("database/hostname").as_deref(), Some("db.local"));
    assert_eq!(rc.get("agillic/client-id").as_deref(), Some("client"));
    assert_eq!(rc.get("no-value"), None);
    assert_eq!(rc.get("missing"), None);
  }

  #[tokio::test]
  async fn test_load_rejects_non_array_reply() {
    let rc = RuntimeConfig::new(canned(json!({ "variables": { "a": "b" } })));
    let err = rc.load().await.unwrap_err();
    assert!(err.is(&ErrorType::ConfigFormat));
    assert!(err.msg.contains("an object"));
    assert!(!rc.is_loaded());
  }

  #[tokio::test]
  async fn test_missing_variables_field_is_format_error() {
    let rc = RuntimeConfig::new(canned(json!({})));
    let err = rc.load().await.unwrap_err();
    assert!(err.is(&ErrorType::ConfigFormat));
  }

  /// Serves its replies in order, the last one forever after
  struct SequenceSource {
    replies: std::sync::Mutex<Vec<Value>>,
  }

  #[async_trait]
  impl VariableSource for SequenceSource {
    async fn list_variables(&self) -> Result<VariableList, InternalError> {
      let mut replies = self.replies.lock().unwrap();
      let body = if replies.len() > 1 { replies.remove(0) } else { replies[0].clone() };
      Ok(VariableList { parent: "projects/p/configs/c".into(), body })
    }
  }

  #[tokio::test]
  async fn test_reload_replaces_whole_mapping() {
    let var = |key: &str, text: &str| {
      json!({ "name": format!("projects/p/configs/c/variables/{}", key), "text": text })
    };
    let source = SequenceSource {
      replies: std::sync::Mutex::new(vec![
        json!({ "variables": [var("a", "1"), var("b", "2")] }),
        json!({ "variables": [var("b", "3")] }),
      ]),
    };
    let rc = RuntimeConfig::new(Arc::new(source));

    rc.load().await.unwrap();
    assert_eq!(rc.get("a").as_deref(), Some("1"));

    rc.load().await.unwrap();
    assert_eq!(rc.get("a"), None);
    assert_eq!(rc.get("b").as_deref(), Some("3"));
  }

  #[tokio::test]
  async fn test_ensure_loaded_loads_once() {
    let source = canned(json!({ "variables": [] }));
    let rc = Arc::new(RuntimeConfig::new(source.clone()));

    let (a, b) = tokio::join!(rc.ensure_loaded(), rc.ensure_loaded());
    a.unwrap();
    b.unwrap();
    rc.ensure_loaded().await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(rc.is_loaded());
  }

  #[tokio::test]
  async fn test_debug_hides_values() {
    let rc = RuntimeConfig::from_static([("agillic/client-secret", "hunter2")]);
    rc.load().await.unwrap();
    let s = format!("{:?}", rc);
    assert!(s.contains("agillic/client-secret"));
    assert!(!s.contains("hunter2"));
  }
}
