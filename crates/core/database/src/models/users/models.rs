use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ADMIN_PERMISSION: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)contracts:delete").expect("valid admin permission regex"));
static SELLER_PERMISSION: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)contracts:update").expect("valid seller permission regex"));

/// Role derived from the permissions column, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
  Admin,
  Seller,
  Customer,
}

impl UserRole {
  pub fn from_permissions(permissions: &str) -> Self {
    if ADMIN_PERMISSION.is_match(permissions) {
      UserRole::Admin
    } else if SELLER_PERMISSION.is_match(permissions) {
      UserRole::Seller
    } else {
      UserRole::Customer
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      UserRole::Admin => "admin",
      UserRole::Seller => "seller",
      UserRole::Customer => "customer",
    }
  }
}

impl fmt::Display for UserRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Snapshot of a user at lookup time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEssentials {
  pub id: u64,
  pub email: String,
  pub name: String,
  pub phone: String,
  pub company_name: String,
  pub address: Option<String>,
  pub zip: Option<String>,
  pub city: Option<String>,
  pub country: Option<String>,
  pub cvr: Option<String>,
  pub role: UserRole,
}

/// Row as returned by the user select, before normalization
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "mysql", derive(sqlx::FromRow))]
pub struct UserRow {
  pub user_id: u64,
  pub email: String,
  pub permissions: Option<String>,
  pub name: Option<String>,
  pub phone: Option<String>,
  pub address1: Option<String>,
  pub address2: Option<String>,
  pub zip: Option<String>,
  pub city: Option<String>,
  pub country: Option<String>,
  pub companyname: Option<String>,
  pub cvr: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string())
}

impl From<UserRow> for UserEssentials {
  fn from(row: UserRow) -> Self {
    let address = match (trimmed(row.address1), trimmed(row.address2)) {
      (Some(line1), Some(line2)) if !line2.is_empty() => Some(format!("{} {}", line1, line2).trim().to_string()),
      (Some(line1), _) => Some(line1),
      (None, Some(line2)) if !line2.is_empty() => Some(line2),
      _ => None,
    };

    UserEssentials {
      id: row.user_id,
      email: row.email.trim().to_string(),
      name: trimmed(row.name).unwrap_or_default(),
      phone: row.phone.unwrap_or_default().chars().filter(|c| !c.is_whitespace()).collect(),
      company_name: trimmed(row.companyname).unwrap_or_default(),
      address,
      zip: trimmed(row.zip),
      city: trimmed(row.city),
      country: trimmed(row.country),
      cvr: trimmed(row.cvr),
      role: UserRole::from_permissions(row.permissions.as_deref().unwrap_or_default()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_role_classification() {
    assert_eq!(UserRole::from_permissions("cp:12:contracts:delete,contracts:update"), UserRole::Admin);
    assert_eq!(UserRole::from_permissions("cp:12:CONTRACTS:DELETE"), UserRole::Admin);
    assert_eq!(UserRole::from_permissions("cp:12:contracts:update"), UserRole::Seller);
    assert_eq!(UserRole::from_permissions("cp:12:Contracts:Update"), UserRole::Seller);
    assert_eq!(UserRole::from_permissions("cp:12:contracts:read"), UserRole::Customer);
    assert_eq!(UserRole::from_permissions(""), UserRole::Customer);
  }

  #[test]
  fn test_row_normalization() {
    let row = UserRow {
      user_id: 7,
      email: "  a@x.com \n".into(),
      permissions: Some("cp:3:contracts:delete".into()),
      name: Some(" Anna Admin ".into()),
      phone: Some(" +45 12 34 56 78 ".into()),
      address1: Some(" Vestergade 1 ".into()),
      address2: Some(" 2. tv ".into()),
      zip: Some(" 1456 ".into()),
      city: Some(" København K ".into()),
      country: Some(" Denmark".into()),
      companyname: Some(" Omnicar A/S ".into()),
      cvr: Some(" 12345678 ".into()),
    };

    let user = UserEssentials::from(row);
    assert_eq!(user.id, 7);
    assert_eq!(user.email, "a@x.com");
    assert_eq!(user.name, "Anna Admin");
    assert_eq!(user.phone, "+4512345678");
    assert_eq!(user.company_name, "Omnicar A/S");
    assert_eq!(user.address.as_deref(), Some("Vestergade 1 2. tv"));
    assert_eq!(user.zip.as_deref(), Some("1456"));
    assert_eq!(user.city.as_deref(), Some("København K"));
    assert_eq!(user.country.as_deref(), Some("Denmark"));
    assert_eq!(user.cvr.as_deref(), Some("12345678"));
    assert_eq!(user.role, UserRole::Admin);
  }

  #[test]
  fn test_missing_optional_columns() {
    let row = UserRow {
      user_id: 542,
      email: "c@x.com".into(),
      address1: Some("Main St 2".into()),
      address2: Some("   ".into()),
      ..Default::default()
    };

    let user = UserEssentials::from(row);
    assert_eq!(user.name, "");
    assert_eq!(user.phone, "");
    assert_eq!(user.address.as_deref(), Some("Main St 2"));
    assert_eq!(user.cvr, None);
    assert_eq!(user.role, UserRole::Customer);
  }
}
