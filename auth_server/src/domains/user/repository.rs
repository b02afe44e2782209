use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use civica_core::contracts::{SettingsRepository, UserRepository};
use civica_core::error::CoreError;
use civica_core::models::{
  CreateUser, OauthProfileUpdate, Settings, User, DEFAULT_AUTOMATIC_LOGOUT, DEFAULT_CHECKOUT_DAYS,
};

const USER_COLUMNS: &str = "id, name, email, phone, code, score, referrer_id, last_seen, \
   email_verified_at, phone_verified_at, oauth_access_token, oauth_refresh_token, \
   password_hash, created_at";

pub struct SqlxUserRepository {
  pool: PgPool,
}

impl SqlxUserRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
  async fn create(&self, input: &CreateUser) -> Result<User, CoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
      r#"
      INSERT INTO users (name, email, phone, code, password_hash, oauth_access_token, oauth_refresh_token)
      VALUES ($1, $2, $3, $4, $5, $6, $7)
      RETURNING {USER_COLUMNS}
      "#,
    ))
    .bind(&input.name)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(&input.code)
    .bind(&input.password_hash)
    .bind(&input.oauth_access_token)
    .bind(&input.oauth_refresh_token)
    .fetch_one(&self.pool)
    .await?;

    Ok(user)
  }

  async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
      r#"
      SELECT {USER_COLUMNS}
      FROM users
      WHERE id = $1
      "#,
    ))
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(user)
  }

  async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
      r#"
      SELECT {USER_COLUMNS}
      FROM users
      WHERE email = $1
      "#,
    ))
    .bind(email)
    .fetch_optional(&self.pool)
    .await?;

    Ok(user)
  }

  async fn find_by_code(&self, code: &str) -> Result<Option<User>, CoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
      r#"
      SELECT {USER_COLUMNS}
      FROM users
      WHERE LOWER(code) = LOWER($1)
      "#,
    ))
    .bind(code)
    .fetch_optional(&self.pool)
    .await?;

    Ok(user)
  }

  async fn update_oauth_profile(
    &self,
    id: i64,
    update: &OauthProfileUpdate,
  ) -> Result<User, CoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
      r#"
      UPDATE users
      SET name = $2,
          phone = COALESCE($3, phone),
          code = $4,
          oauth_access_token = $5,
          oauth_refresh_token = $6
      WHERE id = $1
      RETURNING {USER_COLUMNS}
      "#,
    ))
    .bind(id)
    .bind(&update.name)
    .bind(&update.phone)
    .bind(&update.code)
    .bind(&update.oauth_access_token)
    .bind(&update.oauth_refresh_token)
    .fetch_one(&self.pool)
    .await?;

    Ok(user)
  }

  async fn set_referrer(&self, id: i64, referrer_id: i64) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET referrer_id = $2 WHERE id = $1")
      .bind(id)
      .bind(referrer_id)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn update_phone(&self, id: i64, phone: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET phone = $2 WHERE id = $1")
      .bind(id)
      .bind(phone)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn phone_taken_by_other(&self, phone: &str, excluding: i64) -> Result<bool, CoreError> {
    let taken: bool = sqlx::query_scalar(
      "SELECT EXISTS(SELECT 1 FROM users WHERE phone = $1 AND id <> $2)",
    )
    .bind(phone)
    .bind(excluding)
    .fetch_one(&self.pool)
    .await?;

    Ok(taken)
  }

  async fn mark_phone_verified(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET phone_verified_at = $2 WHERE id = $1")
      .bind(id)
      .bind(at)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn mark_email_verified(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET email_verified_at = $2 WHERE id = $1")
      .bind(id)
      .bind(at)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn update_last_seen(&self, id: i64, at: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET last_seen = $2 WHERE id = $1")
      .bind(id)
      .bind(at)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn update_score(&self, id: i64, score: i64) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET score = $2 WHERE id = $1")
      .bind(id)
      .bind(score)
      .execute(&self.pool)
      .await?;

    Ok(())
  }
}

pub struct SqlxSettingsRepository {
  pool: PgPool,
}

impl SqlxSettingsRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
  async fn create_default(&self, user_id: i64) -> Result<Settings, CoreError> {
    sqlx::query(
      r#"
      INSERT INTO settings
        (user_id, automatic_logout, checkout_days_count, show_status, show_level, show_details, privacy, notifications)
      VALUES ($1, $2, $3, TRUE, TRUE, TRUE, $4, $5)
      ON CONFLICT (user_id) DO NOTHING
      "#,
    )
    .bind(user_id)
    .bind(DEFAULT_AUTOMATIC_LOGOUT)
    .bind(DEFAULT_CHECKOUT_DAYS)
    .bind(Json(Settings::default_privacy()))
    .bind(Json(Settings::default_notifications()))
    .execute(&self.pool)
    .await?;

    self
      .find_by_user(user_id)
      .await?
      .ok_or_else(|| CoreError::Internal("settings upsert returned no row".to_string()))
  }

  async fn find_by_user(&self, user_id: i64) -> Result<Option<Settings>, CoreError> {
    let settings = sqlx::query_as::<_, Settings>(
      r#"
      SELECT id, user_id, automatic_logout, checkout_days_count,
             show_status, show_level, show_details, privacy, notifications, created_at
      FROM settings
      WHERE user_id = $1
      "#,
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(settings)
  }
}
