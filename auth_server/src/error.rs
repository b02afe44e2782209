use thiserror::Error;
use tonic::Status;
use tracing::error;

use civica_core::validation::{field_errors_for, Locale};
use civica_core::CoreError;

use crate::config::ConfigError;

/// Service-layer error. Domain code speaks `CoreError`; everything else
/// here is infrastructure wiring. The `From<AppError> for Status` impl
/// below is the only place transport vocabulary appears.
#[derive(Error, Debug)]
pub enum AppError {
  #[error(transparent)]
  Core(#[from] CoreError),

  #[error("config error: {0}")]
  Config(#[from] ConfigError),

  #[error("sqlx error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("nats error: {0}")]
  Nats(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<AppError> for Status {
  fn from(err: AppError) -> Self {
    match err {
      AppError::Core(core) => status_from_core(core),
      other => {
        error!("infrastructure failure: {}", other);
        Status::internal("internal error")
      }
    }
  }
}

/// The canonical domain-kind -> transport-code table. Field-level kinds
/// carry the encoded validation map as the status message; state violations
/// keep their canonical domain message; internal failures are redacted.
pub fn status_from_core(err: CoreError) -> Status {
  if let Some(fields) = field_errors_for(&err, Locale::Fa) {
    return Status::invalid_argument(fields.encode());
  }

  match err {
    CoreError::Validation(msg) => Status::invalid_argument(msg),
    CoreError::InvalidStateValue => Status::invalid_argument("invalid state value"),
    CoreError::InvalidUnlockDuration
    | CoreError::PhoneRequired
    | CoreError::InvalidPhoneFormat
    | CoreError::PhoneAlreadyTaken
    | CoreError::InvalidOtpCode => Status::invalid_argument(err.to_string()),

    CoreError::NotFound(_) | CoreError::AccountSecurityNotFound => {
      Status::not_found(err.to_string())
    }

    CoreError::NotOwned(_) | CoreError::BankAccountNotOwned => {
      Status::permission_denied(err.to_string())
    }

    CoreError::AccountSecurityAlreadyUnlocked => Status::failed_precondition(err.to_string()),

    CoreError::AlreadyExists(_) => Status::already_exists(err.to_string()),

    CoreError::InvalidToken | CoreError::Unauthorized(_) => Status::unauthenticated(err.to_string()),

    CoreError::Database(detail) | CoreError::Internal(detail) | CoreError::Transient(detail) => {
      error!("internal failure: {}", detail);
      Status::internal("internal error")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use civica_core::ValidationErrors;
  use tonic::Code;

  #[test]
  fn canonical_mapping_table() {
    assert_eq!(
      status_from_core(CoreError::InvalidStateValue).code(),
      Code::InvalidArgument
    );
    assert_eq!(
      status_from_core(CoreError::AccountSecurityNotFound).code(),
      Code::NotFound
    );
    assert_eq!(
      status_from_core(CoreError::BankAccountNotOwned).code(),
      Code::PermissionDenied
    );
    assert_eq!(
      status_from_core(CoreError::AccountSecurityAlreadyUnlocked).code(),
      Code::FailedPrecondition
    );
    assert_eq!(
      status_from_core(CoreError::AlreadyExists("user".into())).code(),
      Code::AlreadyExists
    );
    assert_eq!(
      status_from_core(CoreError::InvalidToken).code(),
      Code::Unauthenticated
    );
    assert_eq!(
      status_from_core(CoreError::Database("boom".into())).code(),
      Code::Internal
    );
  }

  #[test]
  fn field_level_kinds_carry_the_encoded_map() {
    let status = status_from_core(CoreError::PhoneAlreadyTaken);
    assert_eq!(status.code(), Code::InvalidArgument);

    let fields = ValidationErrors::decode(status.message()).unwrap();
    assert!(fields.get("phone").is_some());
  }

  #[test]
  fn state_replay_keeps_the_canonical_message() {
    let status = status_from_core(CoreError::InvalidStateValue);
    assert_eq!(status.message(), "invalid state value");
  }

  #[test]
  fn internal_diagnostics_are_redacted() {
    let status = status_from_core(CoreError::Database("password=secret".into()));
    assert_eq!(status.message(), "internal error");
  }
}
