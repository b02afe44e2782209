use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{
  AccountSecurity, CreateUser, OauthProfileUpdate, Otp, PersonalAccessToken, Settings, User,
  UserActivity, UserEvent, UserLog,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
  async fn create(&self, input: &CreateUser) -> Result<User, CoreError>;

  async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError>;

  async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;

  /// Case-insensitive lookup by public code; used for referral propagation.
  async fn find_by_code(&self, code: &str) -> Result<Option<User>, CoreError>;

  /// Overwrite the mutable profile fields and cached IdP tokens of a
  /// returning user.
  async fn update_oauth_profile(
    &self,
    id: i64,
    update: &OauthProfileUpdate,
  ) -> Result<User, CoreError>;

  async fn set_referrer(&self, id: i64, referrer_id: i64) -> Result<(), CoreError>;

  async fn update_phone(&self, id: i64, phone: &str) -> Result<(), CoreError>;

  /// True when the phone belongs to a different user than `excluding`.
  async fn phone_taken_by_other(&self, phone: &str, excluding: i64) -> Result<bool, CoreError>;

  async fn mark_phone_verified(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError>;

  async fn mark_email_verified(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError>;

  async fn update_last_seen(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError>;

  async fn update_score(&self, id: i64, score: i64) -> Result<(), CoreError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
  /// Insert the default settings row; a no-op when one already exists.
  async fn create_default(&self, user_id: i64) -> Result<Settings, CoreError>;

  async fn find_by_user(&self, user_id: i64) -> Result<Option<Settings>, CoreError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
  async fn insert(
    &self,
    user_id: i64,
    name: &str,
    token_hash: &str,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<PersonalAccessToken, CoreError>;

  /// Lookup by secret hash; expired rows are not returned.
  async fn find_live_by_hash(&self, token_hash: &str)
    -> Result<Option<PersonalAccessToken>, CoreError>;

  async fn delete_for_user(&self, user_id: i64) -> Result<(), CoreError>;
}

#[async_trait]
pub trait AccountSecurityRepository: Send + Sync {
  /// Upsert the row into the Locked state with the given window length.
  async fn upsert_locked(&self, user_id: i64, length: i64) -> Result<AccountSecurity, CoreError>;

  async fn find_by_user(&self, user_id: i64) -> Result<Option<AccountSecurity>, CoreError>;

  async fn mark_unlocked(&self, id: i64, until: DateTime<Utc>) -> Result<(), CoreError>;
}

#[async_trait]
pub trait OtpRepository: Send + Sync {
  /// Keyed on `verifiable_id`, so at most one OTP exists per AccountSecurity.
  async fn upsert(
    &self,
    user_id: i64,
    verifiable_id: i64,
    code_hash: &str,
  ) -> Result<Otp, CoreError>;

  async fn find_by_verifiable(&self, verifiable_id: i64) -> Result<Option<Otp>, CoreError>;

  async fn delete(&self, id: i64) -> Result<(), CoreError>;
}

#[async_trait]
pub trait UserEventRepository: Send + Sync {
  async fn append(
    &self,
    user_id: i64,
    event: &str,
    ip: &str,
    device: &str,
    status: i16,
  ) -> Result<UserEvent, CoreError>;
}

#[async_trait]
pub trait UserActivityRepository: Send + Sync {
  async fn open(
    &self,
    user_id: i64,
    started_at: DateTime<Utc>,
    ip: &str,
  ) -> Result<UserActivity, CoreError>;

  async fn latest_for_user(&self, user_id: i64) -> Result<Option<UserActivity>, CoreError>;

  async fn close(
    &self,
    id: i64,
    ended_at: DateTime<Utc>,
    total: i64,
    ip: &str,
  ) -> Result<(), CoreError>;

  /// Sum of `total` across the user's rows.
  async fn total_minutes(&self, user_id: i64) -> Result<i64, CoreError>;
}

#[async_trait]
pub trait UserLogRepository: Send + Sync {
  /// Insert the zeroed ledger row; a no-op when one already exists.
  async fn create_empty(&self, user_id: i64) -> Result<UserLog, CoreError>;

  async fn find_by_user(&self, user_id: i64) -> Result<Option<UserLog>, CoreError>;

  async fn store(&self, log: &UserLog) -> Result<(), CoreError>;
}
