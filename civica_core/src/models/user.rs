use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity of a citizen. Created only through the OAuth callback path.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct User {
  pub id: i64,
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  /// Short public code, unique case-insensitively.
  pub code: String,
  pub score: i64,
  pub referrer_id: Option<i64>,
  pub last_seen: DateTime<Utc>,
  pub email_verified_at: Option<DateTime<Utc>>,
  pub phone_verified_at: Option<DateTime<Utc>>,
  /// Cached identity-provider tokens, refreshed on every callback.
  #[serde(skip)]
  pub oauth_access_token: Option<String>,
  #[serde(skip)]
  pub oauth_refresh_token: Option<String>,
  /// Inert placeholder; the platform never authenticates by password.
  #[serde(skip)]
  pub password_hash: String,
  pub created_at: DateTime<Utc>,
}

impl User {
  pub fn has_verified_phone(&self) -> bool {
    self.phone_verified_at.is_some()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateUser {
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub code: String,
  pub password_hash: String,
  pub oauth_access_token: String,
  pub oauth_refresh_token: String,
}

/// Mutable profile fields overwritten for a returning user on callback.
#[derive(Debug, Clone, PartialEq)]
pub struct OauthProfileUpdate {
  pub name: String,
  pub phone: Option<String>,
  pub code: String,
  pub oauth_access_token: String,
  pub oauth_refresh_token: String,
}
