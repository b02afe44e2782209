//! Process configuration, loaded from the environment.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("missing required environment variable: {0}")]
  MissingEnvVar(String),
  #[error("invalid value for {field}: {value}")]
  InvalidValue { field: String, value: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
  pub server: ServerConfig,
  pub database: DatabaseConfig,
  pub cache: CacheConfig,
  pub messaging: MessagingConfig,
  pub oauth: OauthConfig,
  pub peers: PeerConfig,
  pub sms: SmsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
  pub grpc_port: u16,
  /// Base URL this service is reachable at; used for OAuth callback URIs.
  pub app_url: String,
  /// Default landing page when the client supplied no redirect hint.
  pub front_end_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
  pub user: String,
  pub password: String,
  pub host: String,
  pub port: u16,
  pub database: String,
  pub max_connections: u32,
  pub min_connections: u32,
  pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
  pub fn url(&self) -> String {
    format!(
      "postgres://{}:{}@{}:{}/{}",
      self.user, self.password, self.host, self.port, self.database
    )
  }

  /// Database URL with the password masked, safe to log.
  pub fn masked_url(&self) -> String {
    format!(
      "postgres://{}:***@{}:{}/{}",
      self.user, self.host, self.port, self.database
    )
  }

  pub fn max_lifetime(&self) -> Duration {
    Duration::from_secs(self.max_lifetime_secs)
  }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
  pub redis_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessagingConfig {
  pub nats_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OauthConfig {
  pub server_url: String,
  pub client_id: String,
  pub client_secret: String,
}

/// Peer addresses as `<host>:<port>`; a missing entry leaves the client
/// slot empty and every read on it degrades to the neutral answer.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PeerConfig {
  pub levels_addr: Option<String>,
  pub challenges_addr: Option<String>,
  pub features_addr: Option<String>,
  pub commercial_addr: Option<String>,
  pub notifications_addr: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SmsConfig {
  pub provider: Option<String>,
  pub api_key: Option<String>,
  pub sender: Option<String>,
}

fn required(name: &str) -> Result<String, ConfigError> {
  env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
  env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_port(name: &str, value: &str) -> Result<u16, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidValue {
    field: name.to_string(),
    value: value.to_string(),
  })
}

impl AppConfig {
  pub fn load() -> Result<Self, ConfigError> {
    let grpc_port = required("GRPC_PORT")?;
    let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());

    Ok(Self {
      server: ServerConfig {
        grpc_port: parse_port("GRPC_PORT", &grpc_port)?,
        app_url: required("APP_URL")?,
        front_end_url: required("FRONT_END_URL")?,
      },
      database: DatabaseConfig {
        user: required("DB_USER")?,
        password: required("DB_PASSWORD")?,
        host: required("DB_HOST")?,
        port: parse_port("DB_PORT", &db_port)?,
        database: required("DB_DATABASE")?,
        max_connections: 25,
        min_connections: 5,
        max_lifetime_secs: 300,
      },
      cache: CacheConfig {
        redis_url: required("REDIS_URL")?,
      },
      messaging: MessagingConfig {
        nats_url: env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
      },
      oauth: OauthConfig {
        server_url: required("OAUTH_SERVER_URL")?,
        client_id: required("OAUTH_CLIENT_ID")?,
        client_secret: required("OAUTH_CLIENT_SECRET")?,
      },
      peers: PeerConfig {
        levels_addr: optional("LEVELS_SERVICE_ADDR"),
        challenges_addr: optional("CHALLENGES_SERVICE_ADDR"),
        features_addr: optional("FEATURES_SERVICE_ADDR"),
        commercial_addr: optional("COMMERCIAL_SERVICE_ADDR"),
        notifications_addr: optional("NOTIFICATIONS_SERVICE_ADDR"),
      },
      sms: SmsConfig {
        provider: optional("SMS_PROVIDER"),
        api_key: optional("SMS_API_KEY"),
        sender: optional("SMS_SENDER"),
      },
    })
  }

  /// One-line summary with secrets masked, logged at startup.
  pub fn summary(&self) -> String {
    format!(
      "grpc_port={} db={} redis={} nats={} oauth={}",
      self.server.grpc_port,
      self.database.masked_url(),
      self.cache.redis_url,
      self.messaging.nats_url,
      self.oauth.server_url,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn masked_url_hides_the_password() {
    let db = DatabaseConfig {
      user: "civica".into(),
      password: "hunter2".into(),
      host: "localhost".into(),
      port: 5432,
      database: "civica_auth".into(),
      max_connections: 25,
      min_connections: 5,
      max_lifetime_secs: 300,
    };
    assert!(!db.masked_url().contains("hunter2"));
    assert!(db.url().contains("hunter2"));
  }
}
