use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use usersync_database::UserEssentials;

/// Recipient fields as stored by Agillic, keyed by upper case field name
pub type PersonData = HashMap<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonResult {
  #[serde(rename = "personData")]
  pub person_data: Option<PersonData>,
}

impl PersonResult {
  /// The person data, only when its `EMAIL` is exactly `email`
  pub fn matching(self, email: &str) -> Option<PersonData> {
    let data = self.person_data?;
    match data.get("EMAIL") {
      Some(Value::String(stored)) if stored == email => Some(data),
      _ => None,
    }
  }
}

/// Body of a recipient create
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NewRecipient {
  pub email: String,
  #[serde(rename = "FULLNAME")]
  pub full_name: String,
  pub company_name: String,
  pub mobile_number: String,
  pub customer_permission: bool,
  pub email_permission: bool,
  pub sms_permission: bool,
  pub investor_permission: bool,
  pub employee_permission: bool,
  pub sam_users_permission: bool,
}

impl From<&UserEssentials> for NewRecipient {
  fn from(user: &UserEssentials) -> Self {
    Self {
      email: user.email.clone(),
      full_name: user.name.clone(),
      company_name: user.company_name.clone(),
      mobile_number: user.phone.clone(),
      customer_permission: false,
      email_permission: false,
      sms_permission: false,
      investor_permission: false,
      employee_permission: false,
      sam_users_permission: true,
    }
  }
}

/// Body of a recipient update.
/// Only carries the permission flag owned by this service, consent flags stay untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RecipientUpdate {
  pub email: String,
  #[serde(rename = "FULLNAME")]
  pub full_name: String,
  pub company_name: String,
  pub mobile_number: String,
  pub sam_users_permission: bool,
}

impl From<&UserEssentials> for RecipientUpdate {
  fn from(user: &UserEssentials) -> Self {
    Self {
      email: user.email.clone(),
      full_name: user.name.clone(),
      company_name: user.company_name.clone(),
      mobile_number: user.phone.clone(),
      sam_users_permission: true,
    }
  }
}

/// `{ "personData": ... }` wrapper used by every write
#[derive(Debug, Clone, Serialize)]
pub struct PersonBody<T: Serialize> {
  #[serde(rename = "personData")]
  pub person_data: T,
}
