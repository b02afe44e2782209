use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Url;
use serde::Deserialize;
use tracing::warn;

use civica_core::contracts::{LifecycleObserver, SettingsRepository, StateCache, UserRepository};
use civica_core::error::CoreError;
use civica_core::models::{CreateUser, OauthProfileUpdate, User, DEFAULT_AUTOMATIC_LOGOUT};

use crate::config::OauthConfig;
use crate::domains::auth::token_repository::{sha256_hash, TokenStore};
use crate::services::peer_clients::PeerClients;

const TOKEN_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Referrer chains are short in practice; anything deeper than this is
/// treated as a cycle.
const MAX_REFERRER_DEPTH: usize = 32;

#[derive(Debug, Deserialize)]
pub struct IdpTokens {
  pub access_token: String,
  pub refresh_token: String,
  #[allow(dead_code)]
  pub token_type: String,
  #[allow(dead_code)]
  pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct IdpProfile {
  pub name: String,
  pub email: String,
  pub mobile: Option<String>,
  pub code: Option<String>,
  pub referral: Option<String>,
}

/// The network half of the authorization-code flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
  async fn exchange_code(&self, code: &str) -> Result<IdpTokens, CoreError>;

  async fn fetch_profile(&self, access_token: &str) -> Result<IdpProfile, CoreError>;
}

pub struct HttpIdentityProvider {
  http: reqwest::Client,
  server_url: String,
  client_id: String,
  client_secret: String,
  redirect_uri: String,
}

impl HttpIdentityProvider {
  pub fn new(config: &OauthConfig, app_url: &str) -> Self {
    Self {
      http: reqwest::Client::new(),
      server_url: config.server_url.trim_end_matches('/').to_string(),
      client_id: config.client_id.clone(),
      client_secret: config.client_secret.clone(),
      redirect_uri: format!("{}/auth/callback", app_url.trim_end_matches('/')),
    }
  }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
  async fn exchange_code(&self, code: &str) -> Result<IdpTokens, CoreError> {
    let params = [
      ("grant_type", "authorization_code"),
      ("client_id", self.client_id.as_str()),
      ("client_secret", self.client_secret.as_str()),
      ("redirect_uri", self.redirect_uri.as_str()),
      ("code", code),
    ];

    let response = self
      .http
      .post(format!("{}/oauth/token", self.server_url))
      .timeout(TOKEN_EXCHANGE_TIMEOUT)
      .form(&params)
      .send()
      .await
      .map_err(|e| CoreError::Internal(format!("token exchange failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(CoreError::Internal(format!(
        "token exchange rejected ({}): {}",
        status, body
      )));
    }

    response
      .json()
      .await
      .map_err(|e| CoreError::Internal(format!("token exchange returned malformed body: {}", e)))
  }

  async fn fetch_profile(&self, access_token: &str) -> Result<IdpProfile, CoreError> {
    let response = self
      .http
      .get(format!("{}/api/user", self.server_url))
      .timeout(PROFILE_FETCH_TIMEOUT)
      .bearer_auth(access_token)
      .send()
      .await
      .map_err(|e| CoreError::Internal(format!("profile fetch failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(CoreError::Internal(format!(
        "profile fetch rejected ({}): {}",
        status, body
      )));
    }

    response
      .json()
      .await
      .map_err(|e| CoreError::Internal(format!("profile fetch returned malformed body: {}", e)))
  }
}

/// Generate a 40-hex-character single-use OAuth state.
pub fn generate_state() -> String {
  use rand::{thread_rng, Rng};

  let random_bytes: [u8; 20] = thread_rng().r#gen();
  hex::encode(random_bytes)
}

#[derive(Debug)]
pub struct CallbackOutcome {
  pub token: String,
  pub expires_in_minutes: i64,
  pub redirect_url: String,
}

/// Orchestrates the authorization-code flow against the external identity
/// provider and reconciles the local user record on every callback.
pub struct OauthOrchestrator {
  idp: Arc<dyn IdentityProvider>,
  state_cache: Arc<dyn StateCache>,
  users: Arc<dyn UserRepository>,
  settings: Arc<dyn SettingsRepository>,
  tokens: TokenStore,
  observer: Arc<dyn LifecycleObserver>,
  peers: Arc<PeerClients>,
  server_url: String,
  client_id: String,
  app_url: String,
  front_end_url: String,
}

impl OauthOrchestrator {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    idp: Arc<dyn IdentityProvider>,
    state_cache: Arc<dyn StateCache>,
    users: Arc<dyn UserRepository>,
    settings: Arc<dyn SettingsRepository>,
    tokens: TokenStore,
    observer: Arc<dyn LifecycleObserver>,
    peers: Arc<PeerClients>,
    oauth: &OauthConfig,
    app_url: &str,
    front_end_url: &str,
  ) -> Self {
    Self {
      idp,
      state_cache,
      users,
      settings,
      tokens,
      observer,
      peers,
      server_url: oauth.server_url.trim_end_matches('/').to_string(),
      client_id: oauth.client_id.clone(),
      app_url: app_url.trim_end_matches('/').to_string(),
      front_end_url: front_end_url.to_string(),
    }
  }

  fn callback_uri(&self) -> String {
    format!("{}/auth/callback", self.app_url)
  }

  /// Registration is pure URL construction; no code redemption follows, so
  /// nothing is cached.
  pub fn register_url(&self, back_url: &str, referral: &str) -> Result<String, CoreError> {
    let mut url = Url::parse(&format!("{}/register", self.server_url))
      .map_err(|e| CoreError::Internal(format!("bad oauth server url: {}", e)))?;
    url
      .query_pairs_mut()
      .append_pair("client_id", &self.client_id)
      .append_pair("redirect_uri", &self.callback_uri())
      .append_pair("referral", referral)
      .append_pair("back_url", back_url);

    Ok(url.to_string())
  }

  /// Issue a single-use state, remember the redirect hints under it, and
  /// return the authorize URL embedding it.
  pub async fn redirect(
    &self,
    redirect_to: &str,
    back_url: &str,
  ) -> Result<(String, String), CoreError> {
    let state = generate_state();

    self.state_cache.set_state(&state).await?;
    if !redirect_to.is_empty() {
      self.state_cache.set_redirect_to(&state, redirect_to).await?;
    }
    if !back_url.is_empty() {
      self.state_cache.set_back_url(&state, back_url).await?;
    }

    let mut url = Url::parse(&format!("{}/oauth/authorize", self.server_url))
      .map_err(|e| CoreError::Internal(format!("bad oauth server url: {}", e)))?;
    url
      .query_pairs_mut()
      .append_pair("client_id", &self.client_id)
      .append_pair("redirect_uri", &self.callback_uri())
      .append_pair("response_type", "code")
      .append_pair("scope", "")
      .append_pair("state", &state);

    Ok((url.to_string(), state))
  }

  /// Redeem an authorization code. The user ends up logged in even when the
  /// downstream fan-out falters; only the state check, the IdP round-trips
  /// and the user/token writes can fail the call.
  pub async fn callback(
    &self,
    state: &str,
    code: &str,
    ip: &str,
    user_agent: &str,
  ) -> Result<CallbackOutcome, CoreError> {
    if !self.state_cache.take_state(state).await? {
      return Err(CoreError::InvalidStateValue);
    }

    let idp_tokens = self.idp.exchange_code(code).await?;
    let profile = self.idp.fetch_profile(&idp_tokens.access_token).await?;

    let user = match self.users.find_by_email(&profile.email).await? {
      None => self.create_user(&profile, &idp_tokens).await?,
      Some(existing) => {
        self
          .users
          .update_oauth_profile(
            existing.id,
            &OauthProfileUpdate {
              name: profile.name.clone(),
              phone: profile.mobile.clone(),
              code: profile.code.clone().unwrap_or(existing.code),
              oauth_access_token: idp_tokens.access_token.clone(),
              oauth_refresh_token: idp_tokens.refresh_token.clone(),
            },
          )
          .await?
      }
    };

    let minutes = match self.settings.find_by_user(user.id).await? {
      Some(settings) => settings.effective_automatic_logout(),
      None => DEFAULT_AUTOMATIC_LOGOUT as i64,
    };
    let expires_at = Utc::now() + ChronoDuration::minutes(minutes);

    let token = self.tokens.create(user.id, "login", Some(expires_at)).await?;

    if let Err(e) = self.observer.on_user_login(&user, ip, user_agent).await {
      warn!("login fan-out failed for user {}: {}", user.id, e);
    }

    let redirect_url = self
      .final_redirect_url(state, &token, expires_at.timestamp())
      .await?;

    Ok(CallbackOutcome {
      token,
      expires_in_minutes: minutes,
      redirect_url,
    })
  }

  async fn create_user(
    &self,
    profile: &IdpProfile,
    idp_tokens: &IdpTokens,
  ) -> Result<User, CoreError> {
    let user = self
      .users
      .create(&CreateUser {
        name: profile.name.clone(),
        email: profile.email.clone(),
        phone: profile.mobile.clone(),
        code: profile.code.clone().unwrap_or_else(generate_state),
        password_hash: placeholder_password_hash(),
        oauth_access_token: idp_tokens.access_token.clone(),
        oauth_refresh_token: idp_tokens.refresh_token.clone(),
      })
      .await?;

    if let Some(referral) = profile.referral.as_deref().filter(|r| !r.is_empty()) {
      if let Err(e) = self.assign_referrer(&user, referral).await {
        warn!("referrer assignment failed for user {}: {}", user.id, e);
      }
    }

    if let Err(e) = self.observer.on_user_created(&user).await {
      warn!("creation fan-out failed for user {}: {}", user.id, e);
    }

    // Wallet creation belongs to the orchestrator, not the observer.
    self.peers.create_wallet(user.id).await;

    Ok(user)
  }

  /// The storage schema does not forbid referrer cycles; a bounded walk
  /// upward does.
  async fn assign_referrer(&self, user: &User, referral: &str) -> Result<(), CoreError> {
    let Some(referrer) = self.users.find_by_code(referral).await? else {
      return Ok(());
    };

    let mut cursor = Some(referrer.id);
    for _ in 0..MAX_REFERRER_DEPTH {
      let Some(current) = cursor else {
        self.users.set_referrer(user.id, referrer.id).await?;
        return Ok(());
      };
      if current == user.id {
        warn!(
          "refusing referrer {} for user {}: would create a cycle",
          referrer.id, user.id
        );
        return Ok(());
      }
      cursor = self
        .users
        .find_by_id(current)
        .await?
        .and_then(|u| u.referrer_id);
    }

    warn!(
      "refusing referrer {} for user {}: chain too deep",
      referrer.id, user.id
    );
    Ok(())
  }

  async fn final_redirect_url(
    &self,
    state: &str,
    token: &str,
    expires_at: i64,
  ) -> Result<String, CoreError> {
    let redirect_to = self.state_cache.take_redirect_to(state).await?;
    let back_url = self.state_cache.take_back_url(state).await?;

    let base = redirect_to
      .filter(|v| !v.is_empty())
      .or(back_url.filter(|v| !v.is_empty()))
      .unwrap_or_else(|| self.front_end_url.clone());

    let mut url =
      Url::parse(&base).map_err(|e| CoreError::Internal(format!("bad redirect url: {}", e)))?;
    url
      .query_pairs_mut()
      .append_pair("token", token)
      .append_pair("expires_at", &expires_at.to_string());

    Ok(url.to_string())
  }
}

/// The platform never authenticates by password; the stored value is an
/// inert high-entropy placeholder.
fn placeholder_password_hash() -> String {
  use rand::{thread_rng, Rng};

  let random_bytes: [u8; 32] = thread_rng().r#gen();
  sha256_hash(&hex::encode(random_bytes))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use crate::domains::observer::UserObserver;
  use crate::test_utils::{
    test_user, FakeIdentityProvider, InMemorySettingsRepository, InMemoryStateCache,
    InMemoryTokenRepository, InMemoryUserActivityRepository, InMemoryUserEventRepository,
    InMemoryUserLogRepository, InMemoryUserRepository, RecordingStatusPublisher,
  };

  struct Harness {
    orchestrator: OauthOrchestrator,
    users: Arc<InMemoryUserRepository>,
    settings: Arc<InMemorySettingsRepository>,
    events: Arc<InMemoryUserEventRepository>,
    activities: Arc<InMemoryUserActivityRepository>,
  }

  fn harness() -> Harness {
    let users = Arc::new(InMemoryUserRepository::default());
    let settings = Arc::new(InMemorySettingsRepository::default());
    let tokens = Arc::new(InMemoryTokenRepository::default());
    let logs = Arc::new(InMemoryUserLogRepository::default());
    let activities = Arc::new(InMemoryUserActivityRepository::default());
    let events = Arc::new(InMemoryUserEventRepository::default());
    let publisher = Arc::new(RecordingStatusPublisher::default());

    let observer = Arc::new(UserObserver::new(
      users.clone(),
      settings.clone(),
      logs,
      activities.clone(),
      events.clone(),
      publisher,
    ));

    let orchestrator = OauthOrchestrator::new(
      Arc::new(FakeIdentityProvider::default()),
      Arc::new(InMemoryStateCache::default()),
      users.clone(),
      settings.clone(),
      TokenStore::new(tokens, users.clone()),
      observer,
      Arc::new(PeerClients::disconnected()),
      &OauthConfig {
        server_url: "https://idp.example".into(),
        client_id: "42".into(),
        client_secret: "shh".into(),
      },
      "https://auth.example",
      "https://app.example",
    );

    Harness {
      orchestrator,
      users,
      settings,
      events,
      activities,
    }
  }

  #[test]
  fn state_is_forty_hex_characters() {
    let state = generate_state();
    assert_eq!(state.len(), 40);
    assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[tokio::test]
  async fn register_is_pure_url_construction() {
    let h = harness();
    let first = h.orchestrator.register_url("https://b", "U42").unwrap();
    let second = h.orchestrator.register_url("https://b", "U42").unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with("https://idp.example/register?"));
    assert!(first.contains("client_id=42"));
    assert!(first.contains("referral=U42"));
  }

  #[tokio::test]
  async fn redirect_embeds_a_fresh_state() {
    let h = harness();
    let (url, state) = h.orchestrator.redirect("", "").await.unwrap();

    assert_eq!(state.len(), 40);
    assert!(url.starts_with("https://idp.example/oauth/authorize?"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains(&format!("state={}", state)));
  }

  #[tokio::test]
  async fn happy_path_creates_the_user_and_logs_it_in() {
    let h = harness();
    let (_, state) = h.orchestrator.redirect("", "").await.unwrap();

    let outcome = h
      .orchestrator
      .callback(&state, "C1", "1.2.3.4", "UA/1")
      .await
      .unwrap();

    let user = h.users.by_email("u@x").unwrap();
    assert_eq!(user.name, "U");
    assert!(user.email_verified_at.is_some());
    assert!(h.settings.by_user(user.id).is_some());

    // token is <id>|<secret> with a 64-hex secret half
    let (_, secret) = outcome.token.split_once('|').unwrap();
    assert_eq!(secret.len(), 64);
    assert_eq!(outcome.expires_in_minutes, 55);
    assert!(outcome.redirect_url.starts_with("https://app.example/?token="));

    // creation opened an activity row, login opened another
    assert_eq!(h.activities.open_count(user.id), 2);
    assert_eq!(h.events.count_for(user.id), 1);
  }

  #[tokio::test]
  async fn state_replay_is_rejected() {
    let h = harness();
    let (_, state) = h.orchestrator.redirect("", "").await.unwrap();

    h.orchestrator
      .callback(&state, "C1", "1.2.3.4", "UA/1")
      .await
      .unwrap();

    let err = h
      .orchestrator
      .callback(&state, "C2", "1.2.3.4", "UA/1")
      .await
      .unwrap_err();
    assert_eq!(err, CoreError::InvalidStateValue);
  }

  #[tokio::test]
  async fn returning_user_keeps_its_row_and_gets_profile_overwritten() {
    let h = harness();
    let existing = h.users.seed(test_user(9, "u@x"));

    let (_, state) = h.orchestrator.redirect("", "").await.unwrap();
    h.orchestrator
      .callback(&state, "C1", "1.2.3.4", "UA/1")
      .await
      .unwrap();

    let user = h.users.by_email("u@x").unwrap();
    assert_eq!(user.id, existing.id);
    assert_eq!(user.name, "U");
    assert_eq!(user.oauth_access_token.as_deref(), Some("a"));
  }

  #[tokio::test]
  async fn redirect_hint_wins_over_front_end_default() {
    let h = harness();
    let (_, state) = h
      .orchestrator
      .redirect("https://deep.example/page", "https://back.example")
      .await
      .unwrap();

    let outcome = h
      .orchestrator
      .callback(&state, "C1", "1.2.3.4", "UA/1")
      .await
      .unwrap();
    assert!(outcome
      .redirect_url
      .starts_with("https://deep.example/page?token="));
    assert!(outcome.redirect_url.contains("expires_at="));
  }

  #[tokio::test]
  async fn referral_forms_a_forest() {
    let h = harness();
    let referrer = h.users.seed(test_user(3, "ref@x"));

    let (_, state) = h.orchestrator.redirect("", "").await.unwrap();
    h.orchestrator
      .callback(&state, "C1", "1.2.3.4", "UA/1")
      .await
      .unwrap();

    let user = h.users.by_email("u@x").unwrap();
    assert_eq!(user.referrer_id, Some(referrer.id));
  }
}
