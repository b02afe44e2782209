mod oauth;
mod state_cache;
mod token_repository;

pub use oauth::{
  generate_state, CallbackOutcome, HttpIdentityProvider, IdentityProvider, IdpProfile, IdpTokens,
  OauthOrchestrator,
};
pub use state_cache::{RedisStateCache, STATE_TTL_SECS};
pub use token_repository::{generate_token_secret, sha256_hash, SqlxTokenRepository, TokenStore};
