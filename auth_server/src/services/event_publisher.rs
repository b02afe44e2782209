use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use civica_core::contracts::StatusPublisher;
use civica_core::error::CoreError;

use crate::error::AppError;

/// Channel names are external contract; the WebSocket gateway subscribes to
/// them by name.
pub const USER_STATUS_CHANNEL: &str = "user-status-changed";

#[derive(Debug, Serialize, Deserialize)]
struct UserStatusChangedEvent {
  id: u64,
  online: bool,
}

/// Fire-and-forget publisher over the pub/sub broker.
#[derive(Clone)]
pub struct EventPublisher {
  client: async_nats::Client,
}

impl EventPublisher {
  /// Connect and round-trip a flush so a misconfigured broker fails the
  /// process at startup instead of at first publish.
  pub async fn connect(url: &str) -> Result<Self, AppError> {
    let client = async_nats::connect(url)
      .await
      .map_err(|e| AppError::Nats(format!("connect to {} failed: {}", url, e)))?;

    client
      .flush()
      .await
      .map_err(|e| AppError::Nats(format!("connectivity check failed: {}", e)))?;

    info!("connected to pub/sub broker at {}", url);
    Ok(Self { client })
  }

  pub async fn close(&self) {
    let _ = self.client.flush().await;
  }
}

#[async_trait]
impl StatusPublisher for EventPublisher {
  async fn publish_user_status_changed(
    &self,
    user_id: i64,
    online: bool,
  ) -> Result<(), CoreError> {
    let payload = serde_json::to_vec(&UserStatusChangedEvent {
      id: user_id as u64,
      online,
    })?;

    self
      .client
      .publish(USER_STATUS_CHANNEL, payload.into())
      .await
      .map_err(|e| CoreError::Transient(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payload_shape_is_the_external_contract() {
    let payload = serde_json::to_string(&UserStatusChangedEvent {
      id: 7,
      online: true,
    })
    .unwrap();
    assert_eq!(payload, r#"{"id":7,"online":true}"#);
  }
}
