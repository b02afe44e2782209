use async_trait::async_trait;

use crate::error::CoreError;

/// Short-TTL keyed store for OAuth state and redirect hints.
///
/// `take_state` has pull semantics: a successful read removes the entry, so a
/// state value is single-use. Absent or already-consumed state is `false`,
/// not an error; an unreachable backing store is `CoreError::Transient`.
#[async_trait]
pub trait StateCache: Send + Sync {
  async fn set_state(&self, state: &str) -> Result<(), CoreError>;

  async fn take_state(&self, state: &str) -> Result<bool, CoreError>;

  async fn set_redirect_to(&self, state: &str, value: &str) -> Result<(), CoreError>;

  async fn take_redirect_to(&self, state: &str) -> Result<Option<String>, CoreError>;

  async fn set_back_url(&self, state: &str, value: &str) -> Result<(), CoreError>;

  async fn take_back_url(&self, state: &str) -> Result<Option<String>, CoreError>;
}

/// Outbound SMS dispatch, served by the notifications peer.
#[async_trait]
pub trait SmsSender: Send + Sync {
  async fn send(&self, phone: &str, message: &str, reason: &str) -> Result<(), CoreError>;
}

/// Fire-and-forget pub/sub fan-out consumed by out-of-process subscribers.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
  async fn publish_user_status_changed(&self, user_id: i64, online: bool)
    -> Result<(), CoreError>;
}
