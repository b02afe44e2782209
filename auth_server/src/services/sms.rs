use std::sync::Arc;

use async_trait::async_trait;
use tonic::metadata::MetadataValue;
use tonic::Request;

use civica_core::contracts::SmsSender;
use civica_core::error::CoreError;
use civica_protos::civica::v1::SendSmsRequest;

use crate::config::SmsConfig;
use crate::services::peer_clients::PeerClients;

/// SMS dispatch through the notifications peer. Unlike the pool's reads,
/// delivery failure bubbles up: an OTP the user never receives must fail
/// the request that promised it.
pub struct PeerSmsSender {
  peers: Arc<PeerClients>,
  config: SmsConfig,
}

impl PeerSmsSender {
  pub fn new(peers: Arc<PeerClients>, config: SmsConfig) -> Self {
    Self { peers, config }
  }
}

#[async_trait]
impl SmsSender for PeerSmsSender {
  async fn send(&self, phone: &str, message: &str, reason: &str) -> Result<(), CoreError> {
    let mut client = self
      .peers
      .notifications_client()
      .ok_or_else(|| CoreError::Transient("sms gateway unreachable".to_string()))?;

    let mut request = Request::new(SendSmsRequest {
      phone: phone.to_string(),
      message: message.to_string(),
      reason: reason.to_string(),
      provider: self.config.provider.clone().unwrap_or_default(),
      sender: self.config.sender.clone().unwrap_or_default(),
    });

    if let Some(api_key) = &self.config.api_key {
      if let Ok(value) = MetadataValue::try_from(api_key.as_str()) {
        request.metadata_mut().insert("x-api-key", value);
      }
    }

    client
      .send_sms(request)
      .await
      .map_err(|e| CoreError::Transient(format!("sms dispatch failed: {}", e)))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn unreachable_gateway_is_a_transient_error() {
    let sender = PeerSmsSender::new(Arc::new(PeerClients::disconnected()), SmsConfig::default());

    let err = sender.send("09121112233", "code", "verify").await.unwrap_err();
    assert!(matches!(err, CoreError::Transient(_)));
  }
}
