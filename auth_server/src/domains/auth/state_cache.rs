use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tokio::sync::RwLock;

use civica_core::contracts::StateCache;
use civica_core::error::CoreError;

/// OAuth state and redirect hints live for five minutes.
pub const STATE_TTL_SECS: u64 = 300;

const KEY_PREFIX: &str = "auth";

/// Redis-backed ephemeral store for the OAuth orchestrator. Reads consume:
/// the single-use guarantee rides on `GETDEL`, so two concurrent callbacks
/// with the same state race for exactly one success.
pub struct RedisStateCache {
  conn: Arc<RwLock<MultiplexedConnection>>,
}

impl RedisStateCache {
  pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
    let client = Client::open(url)?;
    let conn = client.get_multiplexed_async_connection().await?;

    Ok(Self {
      conn: Arc::new(RwLock::new(conn)),
    })
  }

  fn key(bucket: &str, state: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, bucket, state)
  }

  async fn set(&self, bucket: &str, state: &str, value: &str) -> Result<(), CoreError> {
    let mut conn = self.conn.write().await;
    conn
      .set_ex::<_, _, ()>(Self::key(bucket, state), value, STATE_TTL_SECS)
      .await
      .map_err(|e| CoreError::Transient(e.to_string()))
  }

  async fn take(&self, bucket: &str, state: &str) -> Result<Option<String>, CoreError> {
    let mut conn = self.conn.write().await;
    conn
      .get_del(Self::key(bucket, state))
      .await
      .map_err(|e| CoreError::Transient(e.to_string()))
  }
}

#[async_trait]
impl StateCache for RedisStateCache {
  async fn set_state(&self, state: &str) -> Result<(), CoreError> {
    self.set("state", state, "1").await
  }

  async fn take_state(&self, state: &str) -> Result<bool, CoreError> {
    Ok(self.take("state", state).await?.is_some())
  }

  async fn set_redirect_to(&self, state: &str, value: &str) -> Result<(), CoreError> {
    self.set("redirect_to", state, value).await
  }

  async fn take_redirect_to(&self, state: &str) -> Result<Option<String>, CoreError> {
    self.take("redirect_to", state).await
  }

  async fn set_back_url(&self, state: &str, value: &str) -> Result<(), CoreError> {
    self.set("back_url", state, value).await
  }

  async fn take_back_url(&self, state: &str) -> Result<Option<String>, CoreError> {
    self.take("back_url", state).await
  }
}
