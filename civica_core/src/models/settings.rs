use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

pub const DEFAULT_AUTOMATIC_LOGOUT: i32 = 55;
pub const MIN_AUTOMATIC_LOGOUT: i32 = 1;
pub const MAX_AUTOMATIC_LOGOUT: i32 = 55;

pub const DEFAULT_CHECKOUT_DAYS: i32 = 3;
pub const MIN_CHECKOUT_DAYS: i32 = 3;
pub const MAX_CHECKOUT_DAYS: i32 = 1000;

/// The notification channels a user can toggle.
pub const NOTIFICATION_CHANNELS: [&str; 10] = [
  "calendar_reminder",
  "challenge_started",
  "level_upgraded",
  "new_follower",
  "profile_visited",
  "deposit_succeeded",
  "withdraw_succeeded",
  "kyc_status_changed",
  "weekly_report",
  "product_updates",
];

/// Per-user preferences, owned 1:1 by a user and created with it.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Settings {
  pub id: i64,
  pub user_id: i64,
  /// Minutes of inactivity before the session expires, 1..=55.
  pub automatic_logout: i32,
  pub checkout_days_count: i32,
  pub show_status: bool,
  pub show_level: bool,
  pub show_details: bool,
  /// Field name -> 0|1 exposure flags.
  pub privacy: Json<BTreeMap<String, i32>>,
  /// Channel name -> enabled.
  pub notifications: Json<BTreeMap<String, bool>>,
  pub created_at: DateTime<Utc>,
}

impl Settings {
  /// Automatic-logout minutes with the legacy zero treated as the default.
  pub fn effective_automatic_logout(&self) -> i64 {
    if self.automatic_logout == 0 {
      DEFAULT_AUTOMATIC_LOGOUT as i64
    } else {
      self.automatic_logout as i64
    }
  }

  pub fn default_privacy() -> BTreeMap<String, i32> {
    [("email", 0), ("phone", 0), ("score", 1), ("referrer", 0)]
      .into_iter()
      .map(|(k, v)| (k.to_string(), v))
      .collect()
  }

  pub fn default_notifications() -> BTreeMap<String, bool> {
    NOTIFICATION_CHANNELS
      .into_iter()
      .map(|c| (c.to_string(), true))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings(automatic_logout: i32) -> Settings {
    Settings {
      id: 1,
      user_id: 1,
      automatic_logout,
      checkout_days_count: DEFAULT_CHECKOUT_DAYS,
      show_status: true,
      show_level: true,
      show_details: true,
      privacy: Json(Settings::default_privacy()),
      notifications: Json(Settings::default_notifications()),
      created_at: Utc::now(),
    }
  }

  #[test]
  fn zero_automatic_logout_falls_back_to_default() {
    assert_eq!(settings(0).effective_automatic_logout(), 55);
    assert_eq!(settings(20).effective_automatic_logout(), 20);
  }

  #[test]
  fn every_notification_channel_defaults_on() {
    let defaults = Settings::default_notifications();
    assert_eq!(defaults.len(), 10);
    assert!(defaults.values().all(|enabled| *enabled));
  }
}
