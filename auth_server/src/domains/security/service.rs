use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use civica_core::contracts::{
  AccountSecurityRepository, OtpRepository, SmsSender, UserEventRepository, UserRepository,
};
use civica_core::error::CoreError;
use civica_core::models::{
  event, User, EVENT_STATUS_SUCCESS, MAX_UNLOCK_MINUTES, MIN_UNLOCK_MINUTES,
};
use civica_core::validation::{IRANIAN_MOBILE, OTP_CODE};

/// Generate a uniformly-random six-digit one-time code.
fn generate_otp_code() -> u32 {
  use rand::{thread_rng, Rng};

  thread_rng().gen_range(100_000..=999_999)
}

/// Gates high-value operations behind a time-boxed unlock window proven by
/// phone possession.
pub struct SecurityService {
  users: Arc<dyn UserRepository>,
  securities: Arc<dyn AccountSecurityRepository>,
  otps: Arc<dyn OtpRepository>,
  events: Arc<dyn UserEventRepository>,
  sms: Arc<dyn SmsSender>,
}

impl SecurityService {
  pub fn new(
    users: Arc<dyn UserRepository>,
    securities: Arc<dyn AccountSecurityRepository>,
    otps: Arc<dyn OtpRepository>,
    events: Arc<dyn UserEventRepository>,
    sms: Arc<dyn SmsSender>,
  ) -> Self {
    Self {
      users,
      securities,
      otps,
      events,
      sms,
    }
  }

  /// Arm the state machine: lock the row with the requested window length,
  /// settle the delivery phone, and dispatch a fresh OTP. SMS transport
  /// failure bubbles up.
  pub async fn request_account_security(
    &self,
    user: &User,
    minutes: i64,
    phone: &str,
  ) -> Result<(), CoreError> {
    if !(MIN_UNLOCK_MINUTES..=MAX_UNLOCK_MINUTES).contains(&minutes) {
      return Err(CoreError::InvalidUnlockDuration);
    }

    let security = self.securities.upsert_locked(user.id, minutes * 60).await?;

    let delivery_phone = if user.has_verified_phone() {
      user
        .phone
        .clone()
        .ok_or_else(|| CoreError::Internal("verified user without phone".to_string()))?
    } else {
      let phone = phone.trim();
      if phone.is_empty() {
        return Err(CoreError::PhoneRequired);
      }
      if !IRANIAN_MOBILE.is_match(phone) {
        return Err(CoreError::InvalidPhoneFormat);
      }
      if self.users.phone_taken_by_other(phone, user.id).await? {
        return Err(CoreError::PhoneAlreadyTaken);
      }
      self.users.update_phone(user.id, phone).await?;
      phone.to_string()
    };

    let code = generate_otp_code();
    let code_hash = bcrypt::hash(code.to_string(), bcrypt::DEFAULT_COST)
      .map_err(|e| CoreError::Internal(format!("otp hashing failed: {}", e)))?;
    self.otps.upsert(user.id, security.id, &code_hash).await?;

    self
      .sms
      .send(&delivery_phone, &format!("کد تایید شما: {}", code), "verify")
      .await?;

    Ok(())
  }

  /// Prove phone possession and open the unlock window. Returns the instant
  /// the window closes. The audit-row write is fatal to the call.
  pub async fn verify_account_security(
    &self,
    user: &User,
    code: &str,
    ip: &str,
    user_agent: &str,
  ) -> Result<DateTime<Utc>, CoreError> {
    if !OTP_CODE.is_match(code) {
      return Err(CoreError::InvalidOtpCode);
    }

    let security = self
      .securities
      .find_by_user(user.id)
      .await?
      .ok_or(CoreError::AccountSecurityNotFound)?;
    if security.unlocked {
      return Err(CoreError::AccountSecurityAlreadyUnlocked);
    }

    let otp = self
      .otps
      .find_by_verifiable(security.id)
      .await?
      .ok_or(CoreError::AccountSecurityNotFound)?;

    let matches = bcrypt::verify(code, &otp.code_hash)
      .map_err(|e| CoreError::Internal(format!("otp verification failed: {}", e)))?;
    if !matches {
      return Err(CoreError::InvalidOtpCode);
    }

    if !user.has_verified_phone() {
      self.users.mark_phone_verified(user.id, Utc::now()).await?;
    }

    let until = Utc::now() + Duration::seconds(security.length);
    self.securities.mark_unlocked(security.id, until).await?;
    self.otps.delete(otp.id).await?;

    self
      .events
      .append(
        user.id,
        event::ACCOUNT_SECURITY_VERIFIED,
        ip,
        user_agent,
        EVENT_STATUS_SUCCESS,
      )
      .await?;

    Ok(until)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{
    test_user, InMemoryAccountSecurityRepository, InMemoryOtpRepository,
    InMemoryUserEventRepository, InMemoryUserRepository, RecordingSmsSender,
  };

  struct Harness {
    service: SecurityService,
    users: Arc<InMemoryUserRepository>,
    securities: Arc<InMemoryAccountSecurityRepository>,
    otps: Arc<InMemoryOtpRepository>,
    events: Arc<InMemoryUserEventRepository>,
    sms: Arc<RecordingSmsSender>,
  }

  fn harness() -> Harness {
    let users = Arc::new(InMemoryUserRepository::default());
    let securities = Arc::new(InMemoryAccountSecurityRepository::default());
    let otps = Arc::new(InMemoryOtpRepository::default());
    let events = Arc::new(InMemoryUserEventRepository::default());
    let sms = Arc::new(RecordingSmsSender::default());

    Harness {
      service: SecurityService::new(
        users.clone(),
        securities.clone(),
        otps.clone(),
        events.clone(),
        sms.clone(),
      ),
      users,
      securities,
      otps,
      events,
      sms,
    }
  }

  fn sent_code(sms: &RecordingSmsSender) -> String {
    let message = sms.last_message().unwrap();
    message
      .chars()
      .filter(|c| c.is_ascii_digit())
      .collect::<String>()
  }

  #[tokio::test]
  async fn unlock_duration_boundaries() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    for minutes in [4, 61] {
      let err = h
        .service
        .request_account_security(&user, minutes, "09121112233")
        .await
        .unwrap_err();
      assert_eq!(err, CoreError::InvalidUnlockDuration);
    }

    for minutes in [5, 60] {
      h.service
        .request_account_security(&user, minutes, "09121112233")
        .await
        .unwrap();
    }
  }

  #[tokio::test]
  async fn phone_rules_for_unverified_users() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    assert_eq!(
      h.service
        .request_account_security(&user, 15, "")
        .await
        .unwrap_err(),
      CoreError::PhoneRequired
    );
    assert_eq!(
      h.service
        .request_account_security(&user, 15, "9123456789")
        .await
        .unwrap_err(),
      CoreError::InvalidPhoneFormat
    );

    let other = test_user(2, "other@x");
    h.users.seed(User {
      phone: Some("09121112233".to_string()),
      ..other
    });
    assert_eq!(
      h.service
        .request_account_security(&user, 15, "09121112233")
        .await
        .unwrap_err(),
      CoreError::PhoneAlreadyTaken
    );

    h.service
      .request_account_security(&user, 15, " 09129998877 ")
      .await
      .unwrap();
    assert_eq!(
      h.users.get(user.id).unwrap().phone.as_deref(),
      Some("09129998877")
    );
  }

  #[tokio::test]
  async fn request_then_verify_opens_the_window() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    h.service
      .request_account_security(&user, 15, "09121112233")
      .await
      .unwrap();

    let security = h.securities.by_user(user.id).unwrap();
    assert_eq!(security.length, 900);
    assert!(!security.unlocked);
    assert_eq!(h.sms.last_reason().as_deref(), Some("verify"));

    let code = sent_code(&h.sms);
    let until = h
      .service
      .verify_account_security(&user, &code, "1.2.3.4", "UA/1")
      .await
      .unwrap();

    let security = h.securities.by_user(user.id).unwrap();
    assert!(security.unlocked);
    assert_eq!(security.until, Some(until));
    let slack = (until - Utc::now() - Duration::seconds(900)).num_seconds().abs();
    assert!(slack <= 2);

    // phone possession proven
    assert!(h.users.get(user.id).unwrap().phone_verified_at.is_some());

    // OTP is single-use
    assert!(h.otps.by_verifiable(security.id).is_none());

    // audit row with the contract literal
    let event = h.events.last_for(user.id).unwrap();
    assert_eq!(event.event, "غیر فعال سازی امنیت حساب کاربری");
    assert_eq!(event.ip, "1.2.3.4");
    assert_eq!(event.device, "UA/1");
    assert_eq!(event.status, 1);
  }

  #[tokio::test]
  async fn wrong_code_leaves_the_machine_challenged() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    h.service
      .request_account_security(&user, 15, "09121112233")
      .await
      .unwrap();

    let err = h
      .service
      .verify_account_security(&user, "000000", "1.2.3.4", "UA/1")
      .await
      .unwrap_err();
    assert_eq!(err, CoreError::InvalidOtpCode);

    let security = h.securities.by_user(user.id).unwrap();
    assert!(!security.unlocked);
    assert!(h.otps.by_verifiable(security.id).is_some());
  }

  #[tokio::test]
  async fn code_format_is_checked_before_anything_else() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    for code in ["12345", "12345a", "1234567"] {
      assert_eq!(
        h.service
          .verify_account_security(&user, code, "ip", "ua")
          .await
          .unwrap_err(),
        CoreError::InvalidOtpCode
      );
    }
  }

  #[tokio::test]
  async fn verify_without_request_is_not_found() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    assert_eq!(
      h.service
        .verify_account_security(&user, "123456", "ip", "ua")
        .await
        .unwrap_err(),
      CoreError::AccountSecurityNotFound
    );
  }

  #[tokio::test]
  async fn second_verify_hits_already_unlocked() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    h.service
      .request_account_security(&user, 5, "09121112233")
      .await
      .unwrap();
    let code = sent_code(&h.sms);
    h.service
      .verify_account_security(&user, &code, "ip", "ua")
      .await
      .unwrap();

    assert_eq!(
      h.service
        .verify_account_security(&user, &code, "ip", "ua")
        .await
        .unwrap_err(),
      CoreError::AccountSecurityAlreadyUnlocked
    );
  }

  #[tokio::test]
  async fn repeated_requests_converge_to_one_otp() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));

    h.service
      .request_account_security(&user, 15, "09121112233")
      .await
      .unwrap();
    h.service
      .request_account_security(&user, 30, "09121112233")
      .await
      .unwrap();

    let security = h.securities.by_user(user.id).unwrap();
    assert_eq!(security.length, 1800);
    assert_eq!(h.otps.count(), 1);

    // only the latest code verifies
    let code = sent_code(&h.sms);
    h.service
      .verify_account_security(&user, &code, "ip", "ua")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn sms_transport_failure_bubbles_up() {
    let h = harness();
    let user = h.users.seed(test_user(1, "u2@x"));
    h.sms.fail_next();

    let err = h
      .service
      .request_account_security(&user, 15, "09121112233")
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::Transient(_)));
  }
}
