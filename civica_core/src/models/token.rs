use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Opaque bearer credential. Only the hash of the secret half is persisted;
/// the plaintext `<id>|<secret>` shape exists once, at creation.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct PersonalAccessToken {
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  #[serde(skip)]
  pub token_hash: String,
  pub expires_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl PersonalAccessToken {
  /// A token with an expiry in the past never validates, even before deletion.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    matches!(self.expires_at, Some(at) if at <= now)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn token(expires_at: Option<DateTime<Utc>>) -> PersonalAccessToken {
    PersonalAccessToken {
      id: 1,
      user_id: 7,
      name: "login".into(),
      token_hash: "abc".into(),
      expires_at,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn expiry_is_enforced() {
    let now = Utc::now();
    assert!(token(Some(now - Duration::seconds(1))).is_expired(now));
    assert!(!token(Some(now + Duration::minutes(5))).is_expired(now));
    assert!(!token(None).is_expired(now));
  }
}
