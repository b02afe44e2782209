use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use civica_core::contracts::{UserActivityRepository, UserEventRepository, UserLogRepository};
use civica_core::error::CoreError;
use civica_core::models::{UserActivity, UserEvent, UserLog};

pub struct SqlxUserEventRepository {
  pool: PgPool,
}

impl SqlxUserEventRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl UserEventRepository for SqlxUserEventRepository {
  async fn append(
    &self,
    user_id: i64,
    event: &str,
    ip: &str,
    device: &str,
    status: i16,
  ) -> Result<UserEvent, CoreError> {
    let event = sqlx::query_as::<_, UserEvent>(
      r#"
      INSERT INTO user_events (user_id, event, ip, device, status)
      VALUES ($1, $2, $3, $4, $5)
      RETURNING id, user_id, event, ip, device, status, created_at
      "#,
    )
    .bind(user_id)
    .bind(event)
    .bind(ip)
    .bind(device)
    .bind(status)
    .fetch_one(&self.pool)
    .await?;

    Ok(event)
  }
}

pub struct SqlxUserActivityRepository {
  pool: PgPool,
}

impl SqlxUserActivityRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl UserActivityRepository for SqlxUserActivityRepository {
  async fn open(
    &self,
    user_id: i64,
    started_at: DateTime<Utc>,
    ip: &str,
  ) -> Result<UserActivity, CoreError> {
    let activity = sqlx::query_as::<_, UserActivity>(
      r#"
      INSERT INTO user_activities (user_id, started_at, ip)
      VALUES ($1, $2, $3)
      RETURNING id, user_id, started_at, ended_at, total, ip, created_at
      "#,
    )
    .bind(user_id)
    .bind(started_at)
    .bind(ip)
    .fetch_one(&self.pool)
    .await?;

    Ok(activity)
  }

  async fn latest_for_user(&self, user_id: i64) -> Result<Option<UserActivity>, CoreError> {
    let activity = sqlx::query_as::<_, UserActivity>(
      r#"
      SELECT id, user_id, started_at, ended_at, total, ip, created_at
      FROM user_activities
      WHERE user_id = $1
      ORDER BY started_at DESC, id DESC
      LIMIT 1
      "#,
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(activity)
  }

  async fn close(
    &self,
    id: i64,
    ended_at: DateTime<Utc>,
    total: i64,
    ip: &str,
  ) -> Result<(), CoreError> {
    sqlx::query(
      r#"
      UPDATE user_activities
      SET ended_at = $2, total = $3, ip = $4
      WHERE id = $1
      "#,
    )
    .bind(id)
    .bind(ended_at)
    .bind(total)
    .bind(ip)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn total_minutes(&self, user_id: i64) -> Result<i64, CoreError> {
    let total: i64 =
      sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM user_activities WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

    Ok(total)
  }
}

pub struct SqlxUserLogRepository {
  pool: PgPool,
}

impl SqlxUserLogRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl UserLogRepository for SqlxUserLogRepository {
  async fn create_empty(&self, user_id: i64) -> Result<UserLog, CoreError> {
    sqlx::query(
      r#"
      INSERT INTO user_logs (user_id)
      VALUES ($1)
      ON CONFLICT (user_id) DO NOTHING
      "#,
    )
    .bind(user_id)
    .execute(&self.pool)
    .await?;

    self
      .find_by_user(user_id)
      .await?
      .ok_or_else(|| CoreError::Internal("user log upsert returned no row".to_string()))
  }

  async fn find_by_user(&self, user_id: i64) -> Result<Option<UserLog>, CoreError> {
    let log = sqlx::query_as::<_, UserLog>(
      r#"
      SELECT user_id, transactions_count, followers_count, deposit_amount, activity_hours, score
      FROM user_logs
      WHERE user_id = $1
      "#,
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(log)
  }

  async fn store(&self, log: &UserLog) -> Result<(), CoreError> {
    sqlx::query(
      r#"
      UPDATE user_logs
      SET transactions_count = $2, followers_count = $3, deposit_amount = $4,
          activity_hours = $5, score = $6
      WHERE user_id = $1
      "#,
    )
    .bind(log.user_id)
    .bind(log.transactions_count)
    .bind(log.followers_count)
    .bind(log.deposit_amount)
    .bind(log.activity_hours)
    .bind(log.score)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}
