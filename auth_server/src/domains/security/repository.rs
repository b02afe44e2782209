use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use civica_core::contracts::{AccountSecurityRepository, OtpRepository};
use civica_core::error::CoreError;
use civica_core::models::{AccountSecurity, Otp};

pub struct SqlxAccountSecurityRepository {
  pool: PgPool,
}

impl SqlxAccountSecurityRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl AccountSecurityRepository for SqlxAccountSecurityRepository {
  async fn upsert_locked(&self, user_id: i64, length: i64) -> Result<AccountSecurity, CoreError> {
    let security = sqlx::query_as::<_, AccountSecurity>(
      r#"
      INSERT INTO account_securities (user_id, unlocked, length, until)
      VALUES ($1, FALSE, $2, NULL)
      ON CONFLICT (user_id) DO UPDATE
        SET unlocked = FALSE, length = EXCLUDED.length, until = NULL, updated_at = NOW()
      RETURNING id, user_id, unlocked, length, until, created_at, updated_at
      "#,
    )
    .bind(user_id)
    .bind(length)
    .fetch_one(&self.pool)
    .await?;

    Ok(security)
  }

  async fn find_by_user(&self, user_id: i64) -> Result<Option<AccountSecurity>, CoreError> {
    let security = sqlx::query_as::<_, AccountSecurity>(
      r#"
      SELECT id, user_id, unlocked, length, until, created_at, updated_at
      FROM account_securities
      WHERE user_id = $1
      "#,
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(security)
  }

  async fn mark_unlocked(&self, id: i64, until: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query(
      r#"
      UPDATE account_securities
      SET unlocked = TRUE, until = $2, updated_at = NOW()
      WHERE id = $1
      "#,
    )
    .bind(id)
    .bind(until)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

pub struct SqlxOtpRepository {
  pool: PgPool,
}

impl SqlxOtpRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl OtpRepository for SqlxOtpRepository {
  async fn upsert(
    &self,
    user_id: i64,
    verifiable_id: i64,
    code_hash: &str,
  ) -> Result<Otp, CoreError> {
    let otp = sqlx::query_as::<_, Otp>(
      r#"
      INSERT INTO otps (user_id, code_hash, verifiable_id)
      VALUES ($1, $2, $3)
      ON CONFLICT (verifiable_id) DO UPDATE
        SET user_id = EXCLUDED.user_id, code_hash = EXCLUDED.code_hash, created_at = NOW()
      RETURNING id, user_id, code_hash, verifiable_id, created_at
      "#,
    )
    .bind(user_id)
    .bind(code_hash)
    .bind(verifiable_id)
    .fetch_one(&self.pool)
    .await?;

    Ok(otp)
  }

  async fn find_by_verifiable(&self, verifiable_id: i64) -> Result<Option<Otp>, CoreError> {
    let otp = sqlx::query_as::<_, Otp>(
      r#"
      SELECT id, user_id, code_hash, verifiable_id, created_at
      FROM otps
      WHERE verifiable_id = $1
      "#,
    )
    .bind(verifiable_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(otp)
  }

  async fn delete(&self, id: i64) -> Result<(), CoreError> {
    sqlx::query(
      r#"
      DELETE FROM otps
      WHERE id = $1
      "#,
    )
    .bind(id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}
