use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Audit event strings surfaced to clients. The Persian literals are part of
/// the external contract and must stay byte-for-byte stable.
pub mod event {
  pub const USER_LOGIN: &str = "ورود به حساب کاربری";
  pub const USER_LOGOUT: &str = "خروج از حساب کاربری";
  pub const ACCOUNT_SECURITY_VERIFIED: &str = "غیر فعال سازی امنیت حساب کاربری";
}

pub const EVENT_STATUS_SUCCESS: i16 = 1;
pub const EVENT_STATUS_FAILURE: i16 = 0;

/// Immutable audit row appended by the observer and by account-security
/// verification.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct UserEvent {
  pub id: i64,
  pub user_id: i64,
  pub event: String,
  pub ip: String,
  pub device: String,
  /// 1 = success, 0 = failure.
  pub status: i16,
  pub created_at: DateTime<Utc>,
}

/// Rolling session record; opened on login, closed on logout. The sum of
/// `total` across rows feeds the activity component of the score.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct UserActivity {
  pub id: i64,
  pub user_id: i64,
  pub started_at: DateTime<Utc>,
  pub ended_at: Option<DateTime<Utc>>,
  /// Session length in minutes, rounded up.
  pub total: i64,
  pub ip: String,
  pub created_at: DateTime<Utc>,
}

/// Per-user score ledger. `score` is always the four-term sum.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct UserLog {
  pub user_id: i64,
  pub transactions_count: f64,
  pub followers_count: f64,
  pub deposit_amount: f64,
  pub activity_hours: f64,
  pub score: f64,
}

impl UserLog {
  /// Activity component: every started hour is worth 0.1.
  pub fn activity_hours_from_minutes(minutes: i64) -> f64 {
    ceil_div(minutes, 60) as f64 * 0.1
  }

  /// The four-term sum is the definition of the score.
  pub fn recompute_score(&mut self) {
    self.score =
      self.transactions_count + self.followers_count + self.deposit_amount + self.activity_hours;
  }

  /// Score mirrored onto the user row, truncated to an integer.
  pub fn score_as_integer(&self) -> i64 {
    self.score as i64
  }
}

/// Minutes between two instants, rounded up; never negative.
pub fn ceil_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
  let seconds = (to - from).num_seconds().max(0);
  ceil_div(seconds, 60)
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
  (value + divisor - 1) / divisor
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn activity_hours_round_up_started_hours() {
    // 125 minutes spans three hours
    let hours = UserLog::activity_hours_from_minutes(125);
    assert!((hours - 0.3).abs() < 1e-9);
    assert!((UserLog::activity_hours_from_minutes(60) - 0.1).abs() < 1e-9);
    assert!((UserLog::activity_hours_from_minutes(61) - 0.2).abs() < 1e-9);
    assert_eq!(UserLog::activity_hours_from_minutes(0), 0.0);
  }

  #[test]
  fn score_is_the_four_term_sum() {
    let mut log = UserLog {
      user_id: 3,
      transactions_count: 2.0,
      followers_count: 5.0,
      deposit_amount: 3.0,
      activity_hours: UserLog::activity_hours_from_minutes(125),
      score: 0.0,
    };
    log.recompute_score();
    assert!((log.score - 10.3).abs() < 1e-9);
    assert_eq!(log.score_as_integer(), 10);
  }

  #[test]
  fn session_minutes_round_up() {
    let start = Utc::now();
    assert_eq!(ceil_minutes(start, start + Duration::seconds(61)), 2);
    assert_eq!(ceil_minutes(start, start + Duration::seconds(60)), 1);
    assert_eq!(ceil_minutes(start, start), 0);
    // clock skew never yields negative totals
    assert_eq!(ceil_minutes(start, start - Duration::seconds(30)), 0);
  }
}
