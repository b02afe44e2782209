use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::warn;

use civica_core::contracts::{
  LifecycleObserver, SettingsRepository, StatusPublisher, UserActivityRepository,
  UserEventRepository, UserLogRepository, UserRepository,
};
use civica_core::error::CoreError;
use civica_core::models::{ceil_minutes, event, User, UserLog, EVENT_STATUS_SUCCESS};

/// Downstream treats `last_seen` older than this as offline; logout rewinds
/// the clock by exactly this much.
fn offline_sentinel() -> Duration {
  Duration::minutes(2)
}

/// Fans a user lifecycle transition out into audit rows, derived-score
/// updates and pub/sub notifications. Audit-row writes are fatal to the
/// entry point; every other step logs and continues.
pub struct UserObserver {
  users: Arc<dyn UserRepository>,
  settings: Arc<dyn SettingsRepository>,
  logs: Arc<dyn UserLogRepository>,
  activities: Arc<dyn UserActivityRepository>,
  events: Arc<dyn UserEventRepository>,
  publisher: Arc<dyn StatusPublisher>,
}

impl UserObserver {
  pub fn new(
    users: Arc<dyn UserRepository>,
    settings: Arc<dyn SettingsRepository>,
    logs: Arc<dyn UserLogRepository>,
    activities: Arc<dyn UserActivityRepository>,
    events: Arc<dyn UserEventRepository>,
    publisher: Arc<dyn StatusPublisher>,
  ) -> Self {
    Self {
      users,
      settings,
      logs,
      activities,
      events,
      publisher,
    }
  }

  /// Re-derive the activity component and the four-term score, then mirror
  /// the truncated score onto the user row.
  async fn calculate_score(&self, user: &User) -> Result<(), CoreError> {
    let minutes = self.activities.total_minutes(user.id).await?;

    let mut log = self
      .logs
      .find_by_user(user.id)
      .await?
      .ok_or_else(|| CoreError::NotFound("user log".to_string()))?;

    log.activity_hours = UserLog::activity_hours_from_minutes(minutes);
    log.recompute_score();
    self.logs.store(&log).await?;

    self.users.update_score(user.id, log.score_as_integer()).await?;

    Ok(())
  }
}

#[async_trait]
impl LifecycleObserver for UserObserver {
  async fn on_user_created(&self, user: &User) -> Result<(), CoreError> {
    let now = Utc::now();

    self.users.mark_email_verified(user.id, now).await?;
    self.settings.create_default(user.id).await?;
    self.logs.create_empty(user.id).await?;
    self.activities.open(user.id, now, "").await?;

    Ok(())
  }

  async fn on_user_login(
    &self,
    user: &User,
    ip: &str,
    user_agent: &str,
  ) -> Result<(), CoreError> {
    let now = Utc::now();

    self
      .events
      .append(user.id, event::USER_LOGIN, ip, user_agent, EVENT_STATUS_SUCCESS)
      .await?;

    if let Err(e) = self.users.update_last_seen(user.id, now).await {
      warn!("failed to touch last_seen for user {}: {}", user.id, e);
    }

    if let Err(e) = self.activities.open(user.id, now, ip).await {
      warn!("failed to open activity for user {}: {}", user.id, e);
    }

    if let Err(e) = self.publisher.publish_user_status_changed(user.id, true).await {
      warn!("failed to publish online status for user {}: {}", user.id, e);
    }

    Ok(())
  }

  async fn on_user_logout(
    &self,
    user: &User,
    ip: &str,
    user_agent: &str,
  ) -> Result<(), CoreError> {
    let now = Utc::now();

    match self.activities.latest_for_user(user.id).await {
      Ok(Some(activity)) => {
        let total = ceil_minutes(activity.started_at, now);
        if let Err(e) = self.activities.close(activity.id, now, total, ip).await {
          warn!("failed to close activity for user {}: {}", user.id, e);
        }
      }
      Ok(None) => {}
      Err(e) => warn!("failed to load latest activity for user {}: {}", user.id, e),
    }

    if let Err(e) = self.on_hour_reached(user).await {
      warn!("score recalculation failed for user {}: {}", user.id, e);
    }

    if let Err(e) = self
      .users
      .update_last_seen(user.id, now - offline_sentinel())
      .await
    {
      warn!("failed to rewind last_seen for user {}: {}", user.id, e);
    }

    self
      .events
      .append(user.id, event::USER_LOGOUT, ip, user_agent, EVENT_STATUS_SUCCESS)
      .await?;

    if let Err(e) = self.publisher.publish_user_status_changed(user.id, false).await {
      warn!("failed to publish offline status for user {}: {}", user.id, e);
    }

    Ok(())
  }

  async fn on_hour_reached(&self, user: &User) -> Result<(), CoreError> {
    self.calculate_score(user).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{
    test_user, InMemorySettingsRepository, InMemoryUserActivityRepository,
    InMemoryUserEventRepository, InMemoryUserLogRepository, InMemoryUserRepository,
    RecordingStatusPublisher,
  };

  struct Harness {
    observer: UserObserver,
    users: Arc<InMemoryUserRepository>,
    settings: Arc<InMemorySettingsRepository>,
    logs: Arc<InMemoryUserLogRepository>,
    activities: Arc<InMemoryUserActivityRepository>,
    events: Arc<InMemoryUserEventRepository>,
    publisher: Arc<RecordingStatusPublisher>,
  }

  fn harness() -> Harness {
    let users = Arc::new(InMemoryUserRepository::default());
    let settings = Arc::new(InMemorySettingsRepository::default());
    let logs = Arc::new(InMemoryUserLogRepository::default());
    let activities = Arc::new(InMemoryUserActivityRepository::default());
    let events = Arc::new(InMemoryUserEventRepository::default());
    let publisher = Arc::new(RecordingStatusPublisher::default());

    Harness {
      observer: UserObserver::new(
        users.clone(),
        settings.clone(),
        logs.clone(),
        activities.clone(),
        events.clone(),
        publisher.clone(),
      ),
      users,
      settings,
      logs,
      activities,
      events,
      publisher,
    }
  }

  #[tokio::test]
  async fn creation_provisions_the_owned_rows() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));

    h.observer.on_user_created(&user).await.unwrap();

    assert!(h.users.get(user.id).unwrap().email_verified_at.is_some());
    assert!(h.settings.by_user(user.id).is_some());
    assert!(h.logs.by_user(user.id).is_some());
    assert_eq!(h.activities.open_count(user.id), 1);
  }

  #[tokio::test]
  async fn creation_is_idempotent_over_existing_settings() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));

    h.observer.on_user_created(&user).await.unwrap();
    let settings_id = h.settings.by_user(user.id).unwrap().id;

    h.observer.on_user_created(&user).await.unwrap();
    assert_eq!(h.settings.by_user(user.id).unwrap().id, settings_id);
  }

  #[tokio::test]
  async fn login_appends_audit_and_announces_online() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));

    h.observer.on_user_login(&user, "1.2.3.4", "UA/1").await.unwrap();

    let event = h.events.last_for(user.id).unwrap();
    assert_eq!(event.event, "ورود به حساب کاربری");
    assert_eq!(event.ip, "1.2.3.4");
    assert_eq!(h.activities.open_count(user.id), 1);
    assert_eq!(h.publisher.published(), vec![(user.id, true)]);
  }

  #[tokio::test]
  async fn login_audit_failure_is_fatal() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));
    h.events.fail_next();

    assert!(h.observer.on_user_login(&user, "ip", "ua").await.is_err());
    // nothing after the audit step ran
    assert_eq!(h.activities.open_count(user.id), 0);
    assert!(h.publisher.published().is_empty());
  }

  #[tokio::test]
  async fn publish_failure_never_fails_the_login() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));
    h.publisher.fail_next();

    h.observer.on_user_login(&user, "ip", "ua").await.unwrap();
    assert_eq!(h.activities.open_count(user.id), 1);
  }

  #[tokio::test]
  async fn logout_closes_the_session_and_rewinds_last_seen() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));
    h.observer.on_user_created(&user).await.unwrap();
    h.observer.on_user_login(&user, "1.2.3.4", "UA/1").await.unwrap();

    h.observer.on_user_logout(&user, "5.6.7.8", "UA/1").await.unwrap();

    let latest = h.activities.latest(user.id).unwrap();
    assert!(latest.ended_at.is_some());
    assert_eq!(latest.ip, "5.6.7.8");

    let event = h.events.last_for(user.id).unwrap();
    assert_eq!(event.event, "خروج از حساب کاربری");

    // sentinel: downstream computes offline from the rewound timestamp
    let last_seen = h.users.get(user.id).unwrap().last_seen;
    let rewound = Utc::now() - last_seen;
    assert!(rewound >= Duration::seconds(115) && rewound <= Duration::seconds(125));

    assert_eq!(
      h.publisher.published(),
      vec![(user.id, true), (user.id, false)]
    );
  }

  #[tokio::test]
  async fn hour_reached_recomputes_the_ledger() {
    let h = harness();
    let user = h.users.seed(test_user(3, "u3@x"));
    h.logs.seed(UserLog {
      user_id: user.id,
      transactions_count: 2.0,
      followers_count: 5.0,
      deposit_amount: 3.0,
      activity_hours: 0.0,
      score: 0.0,
    });
    h.activities.seed_total(user.id, 125);

    h.observer.on_hour_reached(&user).await.unwrap();

    let log = h.logs.by_user(user.id).unwrap();
    assert!((log.activity_hours - 0.3).abs() < 1e-9);
    assert!((log.score - 10.3).abs() < 1e-9);
    assert_eq!(h.users.get(user.id).unwrap().score, 10);
  }

  #[tokio::test]
  async fn hour_reached_without_ledger_is_an_error() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u@x"));

    assert_eq!(
      h.observer.on_hour_reached(&user).await.unwrap_err(),
      CoreError::NotFound("user log".to_string())
    );
  }
}
