mod reference_sql;

#[cfg(feature = "mysql")]
mod mysql;

use async_trait::async_trait;
use usersync_result::DBError;

use crate::UserEssentials;

/// Columns of the user select, bound parameters: the user id twice
/// (provider subquery, outer filter).
pub const USER_SELECT: &str = r#"
  SELECT
    CAST(u.user_id AS UNSIGNED) AS user_id, u.email, u.permissions,
    cp.name, cp.phone,
    a.address1, a.address2, a.zip, a.city, c.name AS country,
    prov.administrativeName AS companyname, prov.cvr
  FROM user AS u
  JOIN contact_person AS cp ON cp.contact_person_id = u.contact_person_id
  LEFT JOIN address AS a ON a.address_id = cp.address_id
  LEFT JOIN country AS c ON c.country_id = a.country_id
  JOIN contract_provider AS prov ON prov.contract_provider_id = (
    SELECT SUBSTRING(SUBSTRING_INDEX(permissions, ':', 2), 4) FROM user WHERE user_id = ?
  )
  WHERE u.user_id = ?
"#;

#[async_trait]
pub trait UsersRepository: Sync + Send {
  /// Look a user up by primary key, `None` when there is no such user.
  /// Fails with `NotConnected` before `connect()`.
  async fn users_get_by_id(&self, user_id: u64) -> Result<Option<UserEssentials>, DBError>;
}
