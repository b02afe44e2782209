//! In-memory implementations of the repository and infrastructure
//! contracts, plus a canned identity provider. Service tests wire these the
//! same way `AppState` wires the sqlx implementations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use civica_core::contracts::{
  AccountSecurityRepository, OtpRepository, SettingsRepository, SmsSender, StateCache,
  StatusPublisher, TokenRepository, UserActivityRepository, UserEventRepository,
  UserLogRepository, UserRepository,
};
use civica_core::error::CoreError;
use civica_core::models::{
  AccountSecurity, CreateUser, OauthProfileUpdate, Otp, PersonalAccessToken, Settings, User,
  UserActivity, UserEvent, UserLog, DEFAULT_AUTOMATIC_LOGOUT, DEFAULT_CHECKOUT_DAYS,
};

use crate::domains::auth::{IdentityProvider, IdpProfile, IdpTokens};

pub fn test_user(id: i64, email: &str) -> User {
  User {
    id,
    name: format!("user-{}", id),
    email: email.to_string(),
    phone: None,
    code: format!("REF{}", id),
    score: 0,
    referrer_id: None,
    last_seen: Utc::now(),
    email_verified_at: None,
    phone_verified_at: None,
    oauth_access_token: None,
    oauth_refresh_token: None,
    password_hash: "placeholder".to_string(),
    created_at: Utc::now(),
  }
}

fn injected() -> CoreError {
  CoreError::Database("injected failure".to_string())
}

#[derive(Default)]
pub struct InMemoryUserRepository {
  users: Mutex<HashMap<i64, User>>,
  next_id: AtomicI64,
}

impl InMemoryUserRepository {
  pub fn seed(&self, user: User) -> User {
    self.next_id.fetch_max(user.id, Ordering::SeqCst);
    self.users.lock().unwrap().insert(user.id, user.clone());
    user
  }

  pub fn get(&self, id: i64) -> Option<User> {
    self.users.lock().unwrap().get(&id).cloned()
  }

  pub fn by_email(&self, email: &str) -> Option<User> {
    self
      .users
      .lock()
      .unwrap()
      .values()
      .find(|u| u.email == email)
      .cloned()
  }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
  async fn create(&self, input: &CreateUser) -> Result<User, CoreError> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let user = User {
      id,
      name: input.name.clone(),
      email: input.email.clone(),
      phone: input.phone.clone(),
      code: input.code.clone(),
      score: 0,
      referrer_id: None,
      last_seen: Utc::now(),
      email_verified_at: None,
      phone_verified_at: None,
      oauth_access_token: Some(input.oauth_access_token.clone()),
      oauth_refresh_token: Some(input.oauth_refresh_token.clone()),
      password_hash: input.password_hash.clone(),
      created_at: Utc::now(),
    };
    self.users.lock().unwrap().insert(id, user.clone());
    Ok(user)
  }

  async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError> {
    Ok(self.get(id))
  }

  async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
    Ok(self.by_email(email))
  }

  async fn find_by_code(&self, code: &str) -> Result<Option<User>, CoreError> {
    Ok(
      self
        .users
        .lock()
        .unwrap()
        .values()
        .find(|u| u.code.eq_ignore_ascii_case(code))
        .cloned(),
    )
  }

  async fn update_oauth_profile(
    &self,
    id: i64,
    update: &OauthProfileUpdate,
  ) -> Result<User, CoreError> {
    let mut users = self.users.lock().unwrap();
    let user = users
      .get_mut(&id)
      .ok_or_else(|| CoreError::NotFound("user".to_string()))?;
    user.name = update.name.clone();
    if update.phone.is_some() {
      user.phone = update.phone.clone();
    }
    user.code = update.code.clone();
    user.oauth_access_token = Some(update.oauth_access_token.clone());
    user.oauth_refresh_token = Some(update.oauth_refresh_token.clone());
    Ok(user.clone())
  }

  async fn set_referrer(&self, id: i64, referrer_id: i64) -> Result<(), CoreError> {
    let mut users = self.users.lock().unwrap();
    if let Some(user) = users.get_mut(&id) {
      user.referrer_id = Some(referrer_id);
    }
    Ok(())
  }

  async fn update_phone(&self, id: i64, phone: &str) -> Result<(), CoreError> {
    let mut users = self.users.lock().unwrap();
    if let Some(user) = users.get_mut(&id) {
      user.phone = Some(phone.to_string());
    }
    Ok(())
  }

  async fn phone_taken_by_other(&self, phone: &str, excluding: i64) -> Result<bool, CoreError> {
    Ok(
      self
        .users
        .lock()
        .unwrap()
        .values()
        .any(|u| u.id != excluding && u.phone.as_deref() == Some(phone)),
    )
  }

  async fn mark_phone_verified(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError> {
    let mut users = self.users.lock().unwrap();
    if let Some(user) = users.get_mut(&id) {
      user.phone_verified_at = Some(at);
    }
    Ok(())
  }

  async fn mark_email_verified(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError> {
    let mut users = self.users.lock().unwrap();
    if let Some(user) = users.get_mut(&id) {
      user.email_verified_at = Some(at);
    }
    Ok(())
  }

  async fn update_last_seen(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError> {
    let mut users = self.users.lock().unwrap();
    if let Some(user) = users.get_mut(&id) {
      user.last_seen = at;
    }
    Ok(())
  }

  async fn update_score(&self, id: i64, score: i64) -> Result<(), CoreError> {
    let mut users = self.users.lock().unwrap();
    if let Some(user) = users.get_mut(&id) {
      user.score = score;
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemoryTokenRepository {
  tokens: Mutex<Vec<PersonalAccessToken>>,
  next_id: AtomicI64,
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
  async fn insert(
    &self,
    user_id: i64,
    name: &str,
    token_hash: &str,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<PersonalAccessToken, CoreError> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let token = PersonalAccessToken {
      id,
      user_id,
      name: name.to_string(),
      token_hash: token_hash.to_string(),
      expires_at,
      created_at: Utc::now(),
    };
    self.tokens.lock().unwrap().push(token.clone());
    Ok(token)
  }

  async fn find_live_by_hash(
    &self,
    token_hash: &str,
  ) -> Result<Option<PersonalAccessToken>, CoreError> {
    let now = Utc::now();
    Ok(
      self
        .tokens
        .lock()
        .unwrap()
        .iter()
        .find(|t| t.token_hash == token_hash && !t.is_expired(now))
        .cloned(),
    )
  }

  async fn delete_for_user(&self, user_id: i64) -> Result<(), CoreError> {
    self.tokens.lock().unwrap().retain(|t| t.user_id != user_id);
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
  settings: Mutex<HashMap<i64, Settings>>,
  next_id: AtomicI64,
}

impl InMemorySettingsRepository {
  pub fn by_user(&self, user_id: i64) -> Option<Settings> {
    self.settings.lock().unwrap().get(&user_id).cloned()
  }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
  async fn create_default(&self, user_id: i64) -> Result<Settings, CoreError> {
    let mut settings = self.settings.lock().unwrap();
    if let Some(existing) = settings.get(&user_id) {
      return Ok(existing.clone());
    }

    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let row = Settings {
      id,
      user_id,
      automatic_logout: DEFAULT_AUTOMATIC_LOGOUT,
      checkout_days_count: DEFAULT_CHECKOUT_DAYS,
      show_status: true,
      show_level: true,
      show_details: true,
      privacy: sqlx::types::Json(Settings::default_privacy()),
      notifications: sqlx::types::Json(Settings::default_notifications()),
      created_at: Utc::now(),
    };
    settings.insert(user_id, row.clone());
    Ok(row)
  }

  async fn find_by_user(&self, user_id: i64) -> Result<Option<Settings>, CoreError> {
    Ok(self.by_user(user_id))
  }
}

#[derive(Default)]
pub struct InMemoryAccountSecurityRepository {
  rows: Mutex<HashMap<i64, AccountSecurity>>,
  next_id: AtomicI64,
}

impl InMemoryAccountSecurityRepository {
  pub fn by_user(&self, user_id: i64) -> Option<AccountSecurity> {
    self.rows.lock().unwrap().get(&user_id).cloned()
  }
}

#[async_trait]
impl AccountSecurityRepository for InMemoryAccountSecurityRepository {
  async fn upsert_locked(&self, user_id: i64, length: i64) -> Result<AccountSecurity, CoreError> {
    let mut rows = self.rows.lock().unwrap();
    let now = Utc::now();

    let row = rows
      .entry(user_id)
      .and_modify(|row| {
        row.unlocked = false;
        row.length = length;
        row.until = None;
        row.updated_at = now;
      })
      .or_insert_with(|| AccountSecurity {
        id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        user_id,
        unlocked: false,
        length,
        until: None,
        created_at: now,
        updated_at: now,
      });

    Ok(row.clone())
  }

  async fn find_by_user(&self, user_id: i64) -> Result<Option<AccountSecurity>, CoreError> {
    Ok(self.by_user(user_id))
  }

  async fn mark_unlocked(&self, id: i64, until: DateTime<Utc>) -> Result<(), CoreError> {
    let mut rows = self.rows.lock().unwrap();
    for row in rows.values_mut() {
      if row.id == id {
        row.unlocked = true;
        row.until = Some(until);
        row.updated_at = Utc::now();
      }
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemoryOtpRepository {
  rows: Mutex<HashMap<i64, Otp>>,
  next_id: AtomicI64,
}

impl InMemoryOtpRepository {
  pub fn by_verifiable(&self, verifiable_id: i64) -> Option<Otp> {
    self.rows.lock().unwrap().get(&verifiable_id).cloned()
  }

  pub fn count(&self) -> usize {
    self.rows.lock().unwrap().len()
  }
}

#[async_trait]
impl OtpRepository for InMemoryOtpRepository {
  async fn upsert(
    &self,
    user_id: i64,
    verifiable_id: i64,
    code_hash: &str,
  ) -> Result<Otp, CoreError> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let otp = Otp {
      id,
      user_id,
      code_hash: code_hash.to_string(),
      verifiable_id,
      created_at: Utc::now(),
    };
    self.rows.lock().unwrap().insert(verifiable_id, otp.clone());
    Ok(otp)
  }

  async fn find_by_verifiable(&self, verifiable_id: i64) -> Result<Option<Otp>, CoreError> {
    Ok(self.by_verifiable(verifiable_id))
  }

  async fn delete(&self, id: i64) -> Result<(), CoreError> {
    self.rows.lock().unwrap().retain(|_, otp| otp.id != id);
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemoryUserEventRepository {
  events: Mutex<Vec<UserEvent>>,
  next_id: AtomicI64,
  fail_next: AtomicBool,
}

impl InMemoryUserEventRepository {
  pub fn fail_next(&self) {
    self.fail_next.store(true, Ordering::SeqCst);
  }

  pub fn last_for(&self, user_id: i64) -> Option<UserEvent> {
    self
      .events
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|e| e.user_id == user_id)
      .cloned()
  }

  pub fn count_for(&self, user_id: i64) -> usize {
    self
      .events
      .lock()
      .unwrap()
      .iter()
      .filter(|e| e.user_id == user_id)
      .count()
  }
}

#[async_trait]
impl UserEventRepository for InMemoryUserEventRepository {
  async fn append(
    &self,
    user_id: i64,
    event: &str,
    ip: &str,
    device: &str,
    status: i16,
  ) -> Result<UserEvent, CoreError> {
    if self.fail_next.swap(false, Ordering::SeqCst) {
      return Err(injected());
    }

    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let event = UserEvent {
      id,
      user_id,
      event: event.to_string(),
      ip: ip.to_string(),
      device: device.to_string(),
      status,
      created_at: Utc::now(),
    };
    self.events.lock().unwrap().push(event.clone());
    Ok(event)
  }
}

#[derive(Default)]
pub struct InMemoryUserActivityRepository {
  rows: Mutex<Vec<UserActivity>>,
  next_id: AtomicI64,
}

impl InMemoryUserActivityRepository {
  pub fn open_count(&self, user_id: i64) -> usize {
    self
      .rows
      .lock()
      .unwrap()
      .iter()
      .filter(|a| a.user_id == user_id)
      .count()
  }

  pub fn latest(&self, user_id: i64) -> Option<UserActivity> {
    self
      .rows
      .lock()
      .unwrap()
      .iter()
      .filter(|a| a.user_id == user_id)
      .max_by_key(|a| (a.started_at, a.id))
      .cloned()
  }

  /// Seed one already-closed session worth `minutes`.
  pub fn seed_total(&self, user_id: i64, minutes: i64) {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let now = Utc::now();
    self.rows.lock().unwrap().push(UserActivity {
      id,
      user_id,
      started_at: now - chrono::Duration::minutes(minutes),
      ended_at: Some(now),
      total: minutes,
      ip: String::new(),
      created_at: now,
    });
  }
}

#[async_trait]
impl UserActivityRepository for InMemoryUserActivityRepository {
  async fn open(
    &self,
    user_id: i64,
    started_at: DateTime<Utc>,
    ip: &str,
  ) -> Result<UserActivity, CoreError> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let activity = UserActivity {
      id,
      user_id,
      started_at,
      ended_at: None,
      total: 0,
      ip: ip.to_string(),
      created_at: Utc::now(),
    };
    self.rows.lock().unwrap().push(activity.clone());
    Ok(activity)
  }

  async fn latest_for_user(&self, user_id: i64) -> Result<Option<UserActivity>, CoreError> {
    Ok(self.latest(user_id))
  }

  async fn close(
    &self,
    id: i64,
    ended_at: DateTime<Utc>,
    total: i64,
    ip: &str,
  ) -> Result<(), CoreError> {
    let mut rows = self.rows.lock().unwrap();
    if let Some(activity) = rows.iter_mut().find(|a| a.id == id) {
      activity.ended_at = Some(ended_at);
      activity.total = total;
      activity.ip = ip.to_string();
    }
    Ok(())
  }

  async fn total_minutes(&self, user_id: i64) -> Result<i64, CoreError> {
    Ok(
      self
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter(|a| a.user_id == user_id)
        .map(|a| a.total)
        .sum(),
    )
  }
}

#[derive(Default)]
pub struct InMemoryUserLogRepository {
  rows: Mutex<HashMap<i64, UserLog>>,
}

impl InMemoryUserLogRepository {
  pub fn seed(&self, log: UserLog) {
    self.rows.lock().unwrap().insert(log.user_id, log);
  }

  pub fn by_user(&self, user_id: i64) -> Option<UserLog> {
    self.rows.lock().unwrap().get(&user_id).cloned()
  }
}

#[async_trait]
impl UserLogRepository for InMemoryUserLogRepository {
  async fn create_empty(&self, user_id: i64) -> Result<UserLog, CoreError> {
    let mut rows = self.rows.lock().unwrap();
    let row = rows.entry(user_id).or_insert(UserLog {
      user_id,
      transactions_count: 0.0,
      followers_count: 0.0,
      deposit_amount: 0.0,
      activity_hours: 0.0,
      score: 0.0,
    });
    Ok(row.clone())
  }

  async fn find_by_user(&self, user_id: i64) -> Result<Option<UserLog>, CoreError> {
    Ok(self.by_user(user_id))
  }

  async fn store(&self, log: &UserLog) -> Result<(), CoreError> {
    self.rows.lock().unwrap().insert(log.user_id, log.clone());
    Ok(())
  }
}

#[derive(Default)]
pub struct RecordingStatusPublisher {
  published: Mutex<Vec<(i64, bool)>>,
  fail_next: AtomicBool,
}

impl RecordingStatusPublisher {
  pub fn fail_next(&self) {
    self.fail_next.store(true, Ordering::SeqCst);
  }

  pub fn published(&self) -> Vec<(i64, bool)> {
    self.published.lock().unwrap().clone()
  }
}

#[async_trait]
impl StatusPublisher for RecordingStatusPublisher {
  async fn publish_user_status_changed(
    &self,
    user_id: i64,
    online: bool,
  ) -> Result<(), CoreError> {
    if self.fail_next.swap(false, Ordering::SeqCst) {
      return Err(CoreError::Transient("broker unreachable".to_string()));
    }
    self.published.lock().unwrap().push((user_id, online));
    Ok(())
  }
}

#[derive(Default)]
pub struct RecordingSmsSender {
  sent: Mutex<Vec<(String, String, String)>>,
  fail_next: AtomicBool,
}

impl RecordingSmsSender {
  pub fn fail_next(&self) {
    self.fail_next.store(true, Ordering::SeqCst);
  }

  pub fn last_message(&self) -> Option<String> {
    self.sent.lock().unwrap().last().map(|(_, m, _)| m.clone())
  }

  pub fn last_reason(&self) -> Option<String> {
    self.sent.lock().unwrap().last().map(|(_, _, r)| r.clone())
  }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
  async fn send(&self, phone: &str, message: &str, reason: &str) -> Result<(), CoreError> {
    if self.fail_next.swap(false, Ordering::SeqCst) {
      return Err(CoreError::Transient("sms gateway unreachable".to_string()));
    }
    self
      .sent
      .lock()
      .unwrap()
      .push((phone.to_string(), message.to_string(), reason.to_string()));
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemoryStateCache {
  states: Mutex<HashSet<String>>,
  redirects: Mutex<HashMap<String, String>>,
  back_urls: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl StateCache for InMemoryStateCache {
  async fn set_state(&self, state: &str) -> Result<(), CoreError> {
    self.states.lock().unwrap().insert(state.to_string());
    Ok(())
  }

  async fn take_state(&self, state: &str) -> Result<bool, CoreError> {
    Ok(self.states.lock().unwrap().remove(state))
  }

  async fn set_redirect_to(&self, state: &str, value: &str) -> Result<(), CoreError> {
    self
      .redirects
      .lock()
      .unwrap()
      .insert(state.to_string(), value.to_string());
    Ok(())
  }

  async fn take_redirect_to(&self, state: &str) -> Result<Option<String>, CoreError> {
    Ok(self.redirects.lock().unwrap().remove(state))
  }

  async fn set_back_url(&self, state: &str, value: &str) -> Result<(), CoreError> {
    self
      .back_urls
      .lock()
      .unwrap()
      .insert(state.to_string(), value.to_string());
    Ok(())
  }

  async fn take_back_url(&self, state: &str) -> Result<Option<String>, CoreError> {
    Ok(self.back_urls.lock().unwrap().remove(state))
  }
}

/// Canned identity provider answering like the mocked IdP in the end-to-end
/// scenarios.
#[derive(Default)]
pub struct FakeIdentityProvider;

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
  async fn exchange_code(&self, _code: &str) -> Result<IdpTokens, CoreError> {
    Ok(IdpTokens {
      access_token: "a".to_string(),
      refresh_token: "r".to_string(),
      token_type: "Bearer".to_string(),
      expires_in: 3600,
    })
  }

  async fn fetch_profile(&self, _access_token: &str) -> Result<IdpProfile, CoreError> {
    Ok(IdpProfile {
      name: "U".to_string(),
      email: "u@x".to_string(),
      mobile: Some("09120000000".to_string()),
      code: Some("U42".to_string()),
      referral: Some("REF3".to_string()),
    })
  }
}
