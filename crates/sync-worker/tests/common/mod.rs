#![allow(dead_code)]

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use base64::engine::{Engine as _, general_purpose};
use serde_json::json;
use usersync_config::{RuntimeConfig, Settings};
use usersync_crm::{CrmClient, PersonData};
use usersync_database::{DatabaseInfoSql, DatabaseSql, ReferenceSqlDb, UserEssentials, UserRole};
use usersync_result::{ErrorType, InternalError};
use usersync_worker::{
  controller::{SyncWorkerController, SyncWorkerControllerArgs},
  models::pubsub::PubSubMessage,
  server::observability::MetricsCollector,
};

/// CRM double recording every call
#[derive(Default)]
pub struct RecordingCrm {
  pub existing: Option<PersonData>,
  pub fail_get: bool,
  pub delay: Option<Duration>,
  pub gets: Mutex<Vec<String>>,
  pub creates: Mutex<Vec<UserEssentials>>,
  pub updates: Mutex<Vec<UserEssentials>>,
  pub in_flight: AtomicUsize,
  pub max_in_flight: AtomicUsize,
}

impl RecordingCrm {
  pub fn calls(&self) -> usize {
    self.gets.lock().unwrap().len()
      + self.creates.lock().unwrap().len()
      + self.updates.lock().unwrap().len()
  }
}

#[async_trait]
impl CrmClient for RecordingCrm {
  async fn get_recipient(&self, email: &str) -> Result<Option<PersonData>, InternalError> {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    self.in_flight.fetch_sub(1, Ordering::SeqCst);

    self.gets.lock().unwrap().push(email.to_string());
    if self.fail_get {
      let msg = format!("Request: GET /recipients/{}, error: 502 Bad Gateway", email);
      return Err(InternalError::plain("test.crm", ErrorType::CrmRequest, msg).temporary());
    }
    Ok(self.existing.clone())
  }

  async fn create_recipient(&self, user: &UserEssentials) -> Result<(), InternalError> {
    self.creates.lock().unwrap().push(user.clone());
    Ok(())
  }

  async fn update_recipient(&self, user: &UserEssentials) -> Result<(), InternalError> {
    self.updates.lock().unwrap().push(user.clone());
    Ok(())
  }
}

pub fn user(id: u64, email: &str, role: UserRole) -> UserEssentials {
  UserEssentials {
    id,
    email: email.to_string(),
    name: "Anna Admin".to_string(),
    phone: "+4512345678".to_string(),
    company_name: "Omnicar A/S".to_string(),
    address: None,
    zip: None,
    city: None,
    country: None,
    cvr: None,
    role,
  }
}

pub struct Harness {
  pub controller: Arc<SyncWorkerController>,
  pub sql_db: Arc<DatabaseSql>,
  pub metrics: Arc<MetricsCollector>,
}

impl Harness {
  pub fn new(crm: Arc<dyn CrmClient>, runtime_config: RuntimeConfig) -> Harness {
    let sql_db = Arc::new(DatabaseInfoSql::Reference.build());
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let controller = SyncWorkerController::new(SyncWorkerControllerArgs {
      config: Arc::new(Settings::default()),
      runtime_config: Arc::new(runtime_config),
      sql_db: sql_db.clone(),
      crm,
      metrics: metrics.clone(),
    });
    Harness { controller: Arc::new(controller), sql_db, metrics }
  }

  pub fn with_crm(crm: Arc<dyn CrmClient>) -> Harness {
    Harness::new(crm, RuntimeConfig::from_static([("agillic/base-url", "http://crm.invalid")]))
  }

  pub fn db(&self) -> &ReferenceSqlDb {
    match &*self.sql_db {
      DatabaseSql::Reference(db) => db,
      #[allow(unreachable_patterns)]
      _ => panic!("reference database expected"),
    }
  }

  pub fn events(&self, event: &str, outcome: &str) -> u64 {
    self.metrics.events_total.with_label_values(&[event, outcome]).get()
  }
}

pub fn envelope(raw_json: &str) -> PubSubMessage {
  PubSubMessage { data: general_purpose::STANDARD.encode(raw_json), ..Default::default() }
}

pub fn event(name: &str, id: serde_json::Value) -> PubSubMessage {
  envelope(&json!({ "name": name, "payload": { "id": id } }).to_string())
}
