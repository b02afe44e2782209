use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::warn;

use civica_protos::civica::v1::{
  ChallengesServiceClient, CommercialServiceClient, CreateWalletRequest, FeaturesServiceClient,
  GetLatestVersionTitleRequest, GetUnansweredQuestionsCountRequest, GetUserLevelRequest, Level,
  LevelsServiceClient, NotificationsServiceClient,
};

use crate::config::PeerConfig;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Long-lived typed clients for the other services in the fleet.
///
/// A peer that cannot be dialed at startup leaves its slot empty, and every
/// read on an empty slot answers neutrally (None, 0, "") instead of
/// erroring. Secondary services flapping must never take the primary path
/// down with them.
pub struct PeerClients {
  levels: Option<LevelsServiceClient<Channel>>,
  challenges: Option<ChallengesServiceClient<Channel>>,
  features: Option<FeaturesServiceClient<Channel>>,
  commercial: Option<CommercialServiceClient<Channel>>,
  notifications: Option<NotificationsServiceClient<Channel>>,
}

async fn dial(addr: Option<&str>, name: &str) -> Option<Channel> {
  let addr = addr?;

  let endpoint = match Endpoint::from_shared(format!("http://{}", addr)) {
    Ok(endpoint) => endpoint.connect_timeout(DIAL_TIMEOUT).timeout(CALL_TIMEOUT),
    Err(e) => {
      warn!("bad address for {} peer ({}): {}", name, addr, e);
      return None;
    }
  };

  match endpoint.connect().await {
    Ok(channel) => Some(channel),
    Err(e) => {
      warn!("{} peer unreachable at {}: {}", name, addr, e);
      None
    }
  }
}

impl PeerClients {
  pub async fn connect(config: &PeerConfig) -> Self {
    Self {
      levels: dial(config.levels_addr.as_deref(), "levels")
        .await
        .map(LevelsServiceClient::new),
      challenges: dial(config.challenges_addr.as_deref(), "challenges")
        .await
        .map(ChallengesServiceClient::new),
      features: dial(config.features_addr.as_deref(), "features")
        .await
        .map(FeaturesServiceClient::new),
      commercial: dial(config.commercial_addr.as_deref(), "commercial")
        .await
        .map(CommercialServiceClient::new),
      notifications: dial(config.notifications_addr.as_deref(), "notifications")
        .await
        .map(NotificationsServiceClient::new),
    }
  }

  /// Every slot empty; everything degrades to the neutral answer.
  pub fn disconnected() -> Self {
    Self {
      levels: None,
      challenges: None,
      features: None,
      commercial: None,
      notifications: None,
    }
  }

  pub async fn get_user_level(&self, user_id: i64) -> (Option<Level>, f64) {
    let Some(client) = &self.levels else {
      return (None, 0.0);
    };

    match client
      .clone()
      .get_user_level(GetUserLevelRequest { user_id })
      .await
    {
      Ok(response) => {
        let inner = response.into_inner();
        (inner.level, inner.socre_percentage_to_next_level)
      }
      Err(e) => {
        warn!("levels read failed for user {}: {}", user_id, e);
        (None, 0.0)
      }
    }
  }

  pub async fn unanswered_questions_count(&self, user_id: i64) -> i64 {
    let Some(client) = &self.challenges else {
      return 0;
    };

    match client
      .clone()
      .get_unanswered_questions_count(GetUnansweredQuestionsCountRequest { user_id })
      .await
    {
      Ok(response) => response.into_inner().count,
      Err(e) => {
        warn!("challenges read failed for user {}: {}", user_id, e);
        0
      }
    }
  }

  pub async fn latest_version_title(&self) -> String {
    let Some(client) = &self.features else {
      return String::new();
    };

    match client
      .clone()
      .get_latest_version_title(GetLatestVersionTitleRequest {})
      .await
    {
      Ok(response) => response.into_inner().title,
      Err(e) => {
        warn!("features read failed: {}", e);
        String::new()
      }
    }
  }

  /// Best-effort; a missing wallet is repaired by the commercial service's
  /// own reconciliation.
  pub async fn create_wallet(&self, user_id: i64) -> Option<i64> {
    let Some(client) = &self.commercial else {
      return None;
    };

    match client
      .clone()
      .create_wallet(CreateWalletRequest { user_id })
      .await
    {
      Ok(response) => Some(response.into_inner().wallet_id),
      Err(e) => {
        warn!("wallet creation failed for user {}: {}", user_id, e);
        None
      }
    }
  }

  pub fn notifications_client(&self) -> Option<NotificationsServiceClient<Channel>> {
    self.notifications.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn empty_slots_answer_neutrally() {
    let peers = PeerClients::disconnected();

    let (level, percentage) = peers.get_user_level(1).await;
    assert!(level.is_none());
    assert_eq!(percentage, 0.0);

    assert_eq!(peers.unanswered_questions_count(1).await, 0);
    assert_eq!(peers.latest_version_title().await, "");
    assert_eq!(peers.create_wallet(1).await, None);
    assert!(peers.notifications_client().is_none());
  }
}
