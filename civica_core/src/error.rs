use thiserror::Error;

/// Core domain error types.
/// These errors represent business domain issues, not technical implementation details.
/// The RPC facade is the only layer that translates them into transport vocabulary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
  /// Database errors from sqlx
  #[error("database error: {0}")]
  Database(String),

  /// Validation errors for business rules
  #[error("validation error: {0}")]
  Validation(String),

  /// Not found errors
  #[error("{0} not found")]
  NotFound(String),

  /// Duplicate creation
  #[error("{0} already exists")]
  AlreadyExists(String),

  /// Ownership mismatch on a mutation
  #[error("{0} is not owned by the caller")]
  NotOwned(String),

  /// Auth failures (missing, malformed or revoked credentials)
  #[error("invalid token")]
  InvalidToken,

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// Requested unlock window is outside the 5..=60 minute bound
  #[error("invalid unlock duration")]
  InvalidUnlockDuration,

  /// Phone is required when the user has no verified phone on record
  #[error("phone is required")]
  PhoneRequired,

  /// Phone does not match the Iranian mobile pattern
  #[error("invalid phone format")]
  InvalidPhoneFormat,

  /// Phone is registered to another user
  #[error("phone already taken")]
  PhoneAlreadyTaken,

  /// OTP code is malformed or does not match the stored hash
  #[error("invalid otp code")]
  InvalidOtpCode,

  #[error("account security not found")]
  AccountSecurityNotFound,

  #[error("account security already unlocked")]
  AccountSecurityAlreadyUnlocked,

  /// Bank account mutation attempted by a non-owner
  #[error("bank account not owned")]
  BankAccountNotOwned,

  /// OAuth state was absent, expired or already consumed
  #[error("invalid state value")]
  InvalidStateValue,

  /// A transient infrastructure failure worth retrying (cache, broker)
  #[error("transient error: {0}")]
  Transient(String),

  /// Internal/unexpected errors
  #[error("internal error: {0}")]
  Internal(String),
}

impl CoreError {
  /// Map sqlx database errors to specific CoreError variants.
  pub fn from_database_error(error: sqlx::Error) -> Self {
    if let Some(db_err) = error.as_database_error() {
      if db_err.is_unique_violation() {
        return Self::map_unique_constraint_error(&error.to_string());
      }
      if db_err.is_foreign_key_violation() {
        return CoreError::NotFound(format!("referenced resource ({})", db_err.message()));
      }
      if db_err.is_check_violation() {
        return CoreError::Validation(format!("constraint violated: {}", db_err.message()));
      }
    }

    CoreError::Database(error.to_string())
  }

  fn map_unique_constraint_error(error_msg: &str) -> Self {
    if error_msg.contains("users_email_key") {
      CoreError::AlreadyExists("user with this email".to_string())
    } else if error_msg.contains("users_phone_key") {
      CoreError::PhoneAlreadyTaken
    } else if error_msg.contains("users_code_key") {
      CoreError::AlreadyExists("user with this code".to_string())
    } else if error_msg.contains("personal_access_tokens_token_hash_key") {
      CoreError::AlreadyExists("access token".to_string())
    } else {
      CoreError::AlreadyExists(format!("resource ({})", error_msg))
    }
  }
}

impl From<sqlx::Error> for CoreError {
  fn from(err: sqlx::Error) -> Self {
    CoreError::from_database_error(err)
  }
}

impl From<serde_json::Error> for CoreError {
  fn from(err: serde_json::Error) -> Self {
    CoreError::Internal(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn named_kinds_render_canonical_messages() {
    assert_eq!(CoreError::InvalidStateValue.to_string(), "invalid state value");
    assert_eq!(
      CoreError::AccountSecurityAlreadyUnlocked.to_string(),
      "account security already unlocked"
    );
    assert_eq!(CoreError::InvalidOtpCode.to_string(), "invalid otp code");
  }

  #[test]
  fn unique_violation_on_phone_maps_to_phone_taken() {
    let err = CoreError::map_unique_constraint_error(
      "duplicate key value violates unique constraint \"users_phone_key\"",
    );
    assert_eq!(err, CoreError::PhoneAlreadyTaken);
  }
}
