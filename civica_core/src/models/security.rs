use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MIN_UNLOCK_MINUTES: i64 = 5;
pub const MAX_UNLOCK_MINUTES: i64 = 60;

/// One record per user gating high-value operations behind an unlock window.
///
/// `unlocked` and `until` move together: the row is unlocked iff `until` is a
/// future timestamp.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct AccountSecurity {
  pub id: i64,
  pub user_id: i64,
  pub unlocked: bool,
  /// Unlock-window length in seconds, derived from requested minutes.
  pub length: i64,
  pub until: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl AccountSecurity {
  pub fn is_unlocked(&self, now: DateTime<Utc>) -> bool {
    self.unlocked && matches!(self.until, Some(until) if until > now)
  }
}

/// One-shot credential linked to an [`AccountSecurity`] row. The
/// `verifiable_id` column is nominally polymorphic but stays typed to
/// AccountSecurity until a second verifiable kind exists.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Otp {
  pub id: i64,
  pub user_id: i64,
  #[serde(skip)]
  pub code_hash: String,
  pub verifiable_id: i64,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn security(unlocked: bool, until: Option<DateTime<Utc>>) -> AccountSecurity {
    AccountSecurity {
      id: 1,
      user_id: 2,
      unlocked,
      length: 900,
      until,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn unlocked_requires_future_until() {
    let now = Utc::now();
    assert!(security(true, Some(now + Duration::seconds(900))).is_unlocked(now));
    assert!(!security(true, Some(now - Duration::seconds(1))).is_unlocked(now));
    assert!(!security(true, None).is_unlocked(now));
    assert!(!security(false, Some(now + Duration::seconds(900))).is_unlocked(now));
  }
}
