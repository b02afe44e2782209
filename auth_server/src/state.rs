use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use civica_core::contracts::{
  LifecycleObserver, SettingsRepository, SmsSender, StatusPublisher, UserRepository,
};

use crate::config::AppConfig;
use crate::domains::auth::{
  HttpIdentityProvider, OauthOrchestrator, RedisStateCache, SqlxTokenRepository, TokenStore,
};
use crate::domains::observer::UserObserver;
use crate::domains::security::{
  SecurityService, SqlxAccountSecurityRepository, SqlxOtpRepository,
};
use crate::domains::user::{
  SqlxSettingsRepository, SqlxUserActivityRepository, SqlxUserEventRepository,
  SqlxUserLogRepository, SqlxUserRepository,
};
use crate::error::AppError;
use crate::migrations::run_migrations;
use crate::services::{EventPublisher, PeerClients, PeerSmsSender};

/// Everything a request handler needs, wired once at startup. There is no
/// other process-global state.
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub pool: PgPool,
  pub token_store: TokenStore,
  pub orchestrator: Arc<OauthOrchestrator>,
  pub security: Arc<SecurityService>,
  pub observer: Arc<dyn LifecycleObserver>,
  pub settings: Arc<dyn SettingsRepository>,
  pub peers: Arc<PeerClients>,
  pub publisher: EventPublisher,
}

impl AppState {
  pub async fn try_new(config: AppConfig) -> Result<Self, AppError> {
    let pool = PgPoolOptions::new()
      .max_connections(config.database.max_connections)
      .min_connections(config.database.min_connections)
      .max_lifetime(config.database.max_lifetime())
      .connect(&config.database.url())
      .await?;
    info!("connected to database at {}", config.database.masked_url());

    run_migrations(&pool).await?;

    let state_cache = Arc::new(RedisStateCache::connect(&config.cache.redis_url).await?);
    let publisher = EventPublisher::connect(&config.messaging.nats_url).await?;
    let peers = Arc::new(PeerClients::connect(&config.peers).await);

    let users: Arc<dyn UserRepository> = Arc::new(SqlxUserRepository::new(pool.clone()));
    let settings: Arc<dyn SettingsRepository> =
      Arc::new(SqlxSettingsRepository::new(pool.clone()));
    let logs = Arc::new(SqlxUserLogRepository::new(pool.clone()));
    let activities = Arc::new(SqlxUserActivityRepository::new(pool.clone()));
    let events = Arc::new(SqlxUserEventRepository::new(pool.clone()));

    let token_store = TokenStore::new(
      Arc::new(SqlxTokenRepository::new(pool.clone())),
      users.clone(),
    );

    let status_publisher: Arc<dyn StatusPublisher> = Arc::new(publisher.clone());
    let observer: Arc<dyn LifecycleObserver> = Arc::new(UserObserver::new(
      users.clone(),
      settings.clone(),
      logs,
      activities,
      events.clone(),
      status_publisher,
    ));

    let sms: Arc<dyn SmsSender> =
      Arc::new(PeerSmsSender::new(peers.clone(), config.sms.clone()));
    let security = Arc::new(SecurityService::new(
      users.clone(),
      Arc::new(SqlxAccountSecurityRepository::new(pool.clone())),
      Arc::new(SqlxOtpRepository::new(pool.clone())),
      events,
      sms,
    ));

    let idp = Arc::new(HttpIdentityProvider::new(
      &config.oauth,
      &config.server.app_url,
    ));
    let orchestrator = Arc::new(OauthOrchestrator::new(
      idp,
      state_cache,
      users,
      settings.clone(),
      token_store.clone(),
      observer.clone(),
      peers.clone(),
      &config.oauth,
      &config.server.app_url,
      &config.server.front_end_url,
    ));

    Ok(Self {
      config: Arc::new(config),
      pool,
      token_store,
      orchestrator,
      security,
      observer,
      settings,
      peers,
      publisher,
    })
  }
}
