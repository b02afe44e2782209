use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::User;

/// Lifecycle fan-out invoked by domain services on user transitions.
///
/// Each entry point performs a fixed, ordered sequence of side effects.
/// Steps that touch primary audit rows are fatal to the call; everything
/// else is logged and continued. Deployments that need a step disabled
/// inject a no-op implementation.
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
  async fn on_user_created(&self, user: &User) -> Result<(), CoreError>;

  async fn on_user_login(&self, user: &User, ip: &str, user_agent: &str)
    -> Result<(), CoreError>;

  async fn on_user_logout(&self, user: &User, ip: &str, user_agent: &str)
    -> Result<(), CoreError>;

  async fn on_hour_reached(&self, user: &User) -> Result<(), CoreError>;
}
