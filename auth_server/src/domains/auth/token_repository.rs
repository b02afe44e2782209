use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use civica_core::contracts::{TokenRepository, UserRepository};
use civica_core::error::CoreError;
use civica_core::models::{PersonalAccessToken, User};

/// Generate the secret half of a bearer token: 32 random bytes, hex encoded.
pub fn generate_token_secret() -> String {
  use rand::{thread_rng, Rng};

  let random_bytes: [u8; 32] = thread_rng().r#gen();
  hex::encode(random_bytes)
}

pub fn sha256_hash(token: &str) -> String {
  use sha2::{Digest, Sha256};

  let mut hasher = Sha256::new();
  hasher.update(token.as_bytes());
  hex::encode(hasher.finalize())
}

/// Split a plaintext bearer token into its `<id>|<secret>` halves.
fn split_plaintext(token: &str) -> Option<(&str, &str)> {
  token.split_once('|').filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
}

pub struct SqlxTokenRepository {
  pool: PgPool,
}

impl SqlxTokenRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
  async fn insert(
    &self,
    user_id: i64,
    name: &str,
    token_hash: &str,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<PersonalAccessToken, CoreError> {
    let token = sqlx::query_as::<_, PersonalAccessToken>(
      r#"
      INSERT INTO personal_access_tokens (user_id, name, token_hash, expires_at)
      VALUES ($1, $2, $3, $4)
      RETURNING id, user_id, name, token_hash, expires_at, created_at
      "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(&self.pool)
    .await?;

    Ok(token)
  }

  async fn find_live_by_hash(
    &self,
    token_hash: &str,
  ) -> Result<Option<PersonalAccessToken>, CoreError> {
    let token = sqlx::query_as::<_, PersonalAccessToken>(
      r#"
      SELECT id, user_id, name, token_hash, expires_at, created_at
      FROM personal_access_tokens
      WHERE token_hash = $1 AND (expires_at IS NULL OR expires_at > NOW())
      "#,
    )
    .bind(token_hash)
    .fetch_optional(&self.pool)
    .await?;

    Ok(token)
  }

  async fn delete_for_user(&self, user_id: i64) -> Result<(), CoreError> {
    sqlx::query(
      r#"
      DELETE FROM personal_access_tokens
      WHERE user_id = $1
      "#,
    )
    .bind(user_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

/// Issues and validates opaque bearer credentials. Only the sha256 of the
/// secret half is ever persisted; the plaintext returned by [`create`] is
/// the only copy that will exist.
#[derive(Clone)]
pub struct TokenStore {
  tokens: Arc<dyn TokenRepository>,
  users: Arc<dyn UserRepository>,
}

impl TokenStore {
  pub fn new(tokens: Arc<dyn TokenRepository>, users: Arc<dyn UserRepository>) -> Self {
    Self { tokens, users }
  }

  pub async fn create(
    &self,
    user_id: i64,
    name: &str,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<String, CoreError> {
    let secret = generate_token_secret();
    let row = self
      .tokens
      .insert(user_id, name, &sha256_hash(&secret), expires_at)
      .await?;

    Ok(format!("{}|{}", row.id, secret))
  }

  /// Resolve a plaintext bearer token to its owning user. Malformed input,
  /// an unknown hash and an expired row all collapse into `InvalidToken`.
  pub async fn validate(&self, plaintext: &str) -> Result<User, CoreError> {
    let (_, secret) = split_plaintext(plaintext).ok_or(CoreError::InvalidToken)?;

    let row = self
      .tokens
      .find_live_by_hash(&sha256_hash(secret))
      .await?
      .ok_or(CoreError::InvalidToken)?;

    self
      .users
      .find_by_id(row.user_id)
      .await?
      .ok_or(CoreError::InvalidToken)
  }

  /// Bulk-revoke every token of the user; used at logout.
  pub async fn delete_user_tokens(&self, user_id: i64) -> Result<(), CoreError> {
    self.tokens.delete_for_user(user_id).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{test_user, InMemoryTokenRepository, InMemoryUserRepository};

  fn store() -> (TokenStore, Arc<InMemoryUserRepository>) {
    let users = Arc::new(InMemoryUserRepository::default());
    let tokens = Arc::new(InMemoryTokenRepository::default());
    (TokenStore::new(tokens, users.clone()), users)
  }

  #[test]
  fn secret_half_is_long_enough() {
    let secret = generate_token_secret();
    assert!(secret.len() >= 40);
    assert_ne!(generate_token_secret(), generate_token_secret());
  }

  #[tokio::test]
  async fn created_token_validates_to_its_owner() {
    let (store, users) = store();
    let user = users.seed(test_user(1, "u@x"));

    let plaintext = store.create(user.id, "login", None).await.unwrap();
    assert!(plaintext.contains('|'));
    let secret = plaintext.split_once('|').unwrap().1;
    assert!(secret.len() >= 40);

    let resolved = store.validate(&plaintext).await.unwrap();
    assert_eq!(resolved.id, user.id);
  }

  #[tokio::test]
  async fn tampered_secret_is_rejected() {
    let (store, users) = store();
    let user = users.seed(test_user(1, "u@x"));

    let plaintext = store.create(user.id, "login", None).await.unwrap();
    let (id, _) = plaintext.split_once('|').unwrap();
    let forged = format!("{}|{}", id, generate_token_secret());

    assert_eq!(
      store.validate(&forged).await.unwrap_err(),
      CoreError::InvalidToken
    );
    assert_eq!(
      store.validate("no-separator").await.unwrap_err(),
      CoreError::InvalidToken
    );
  }

  #[tokio::test]
  async fn expired_token_never_validates() {
    let (store, users) = store();
    let user = users.seed(test_user(1, "u@x"));

    let expired = Utc::now() - chrono::Duration::minutes(1);
    let plaintext = store.create(user.id, "login", Some(expired)).await.unwrap();

    assert_eq!(
      store.validate(&plaintext).await.unwrap_err(),
      CoreError::InvalidToken
    );
  }

  #[tokio::test]
  async fn bulk_revoke_invalidates_every_token() {
    let (store, users) = store();
    let user = users.seed(test_user(1, "u@x"));

    let first = store.create(user.id, "login", None).await.unwrap();
    let second = store.create(user.id, "login", None).await.unwrap();

    store.delete_user_tokens(user.id).await.unwrap();

    assert!(store.validate(&first).await.is_err());
    assert!(store.validate(&second).await.is_err());
  }
}
