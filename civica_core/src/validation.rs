//! Field-scoped validation errors and their wire encoding.
//!
//! Domain services reject bad input with named `CoreError` kinds; the RPC
//! facade converts those kinds into a `field -> translated message` map and
//! carries the encoded map inside the `InvalidArgument` status message. The
//! encoding is opaque to callers and must round-trip UTF-8 (Persian) text.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Iranian mobile numbers: `09` followed by nine digits.
pub static IRANIAN_MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^09\d{9}$").unwrap());

/// One-time codes are exactly six digits.
pub static OTP_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
  #[default]
  Fa,
  En,
}

/// Message templates parameterized by locale and field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTemplate {
  Required,
  Invalid,
  IranianMobile,
  Unique,
  IranianSheba,
  IranianBankCardNumber,
  Len,
}

impl MessageTemplate {
  pub fn render(&self, locale: Locale, field: &str) -> String {
    let field = translate_field(locale, field);
    match (self, locale) {
      (MessageTemplate::Required, Locale::Fa) => format!("{field} الزامی است"),
      (MessageTemplate::Required, Locale::En) => format!("{field} is required"),
      (MessageTemplate::Invalid, Locale::Fa) => format!("{field} معتبر نیست"),
      (MessageTemplate::Invalid, Locale::En) => format!("{field} is invalid"),
      (MessageTemplate::IranianMobile, Locale::Fa) => {
        format!("{field} باید یک شماره موبایل معتبر ایران باشد")
      }
      (MessageTemplate::IranianMobile, Locale::En) => {
        format!("{field} must be a valid Iranian mobile number")
      }
      (MessageTemplate::Unique, Locale::Fa) => format!("{field} قبلا استفاده شده است"),
      (MessageTemplate::Unique, Locale::En) => format!("{field} has already been taken"),
      (MessageTemplate::IranianSheba, Locale::Fa) => {
        format!("{field} باید یک شماره شبای معتبر باشد")
      }
      (MessageTemplate::IranianSheba, Locale::En) => {
        format!("{field} must be a valid IBAN (Sheba) number")
      }
      (MessageTemplate::IranianBankCardNumber, Locale::Fa) => {
        format!("{field} باید یک شماره کارت بانکی معتبر باشد")
      }
      (MessageTemplate::IranianBankCardNumber, Locale::En) => {
        format!("{field} must be a valid bank card number")
      }
      (MessageTemplate::Len, Locale::Fa) => format!("طول {field} معتبر نیست"),
      (MessageTemplate::Len, Locale::En) => format!("{field} has an invalid length"),
    }
  }
}

/// Translate a wire-level field name into the locale the client renders.
fn translate_field(locale: Locale, field: &str) -> String {
  if locale == Locale::En {
    return field.to_string();
  }
  match field {
    "phone" => "شماره موبایل",
    "code" => "کد",
    "email" => "ایمیل",
    "name" => "نام",
    "minutes" => "مدت زمان",
    "sheba" => "شماره شبا",
    "card_number" => "شماره کارت",
    other => other,
  }
  .to_string()
}

/// A `field -> translated message` map surfaced to clients on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn single(field: &str, template: MessageTemplate, locale: Locale) -> Self {
    let mut errors = Self::new();
    errors.add(field, template, locale);
    errors
  }

  pub fn add(&mut self, field: &str, template: MessageTemplate, locale: Locale) {
    self
      .0
      .insert(field.to_string(), template.render(locale, field));
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, field: &str) -> Option<&str> {
    self.0.get(field).map(String::as_str)
  }

  /// Serialize for transport inside a status message.
  pub fn encode(&self) -> String {
    serde_json::to_string(&self.0).unwrap_or_default()
  }

  /// Inverse of [`encode`]; `None` when the payload is not a field map.
  pub fn decode(encoded: &str) -> Option<Self> {
    serde_json::from_str(encoded).map(Self).ok()
  }
}

/// Field map for the domain kinds that carry field-level structure.
/// Kinds without a field counterpart return `None` and keep their canonical
/// domain message.
pub fn field_errors_for(error: &CoreError, locale: Locale) -> Option<ValidationErrors> {
  let errors = match error {
    CoreError::InvalidUnlockDuration => {
      ValidationErrors::single("minutes", MessageTemplate::Invalid, locale)
    }
    CoreError::PhoneRequired => ValidationErrors::single("phone", MessageTemplate::Required, locale),
    CoreError::InvalidPhoneFormat => {
      ValidationErrors::single("phone", MessageTemplate::IranianMobile, locale)
    }
    CoreError::PhoneAlreadyTaken => {
      ValidationErrors::single("phone", MessageTemplate::Unique, locale)
    }
    CoreError::InvalidOtpCode => ValidationErrors::single("code", MessageTemplate::Invalid, locale),
    _ => return None,
  };
  Some(errors)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_decode_round_trips_persian_text() {
    let mut errors = ValidationErrors::new();
    errors.add("phone", MessageTemplate::IranianMobile, Locale::Fa);
    errors.add("code", MessageTemplate::Invalid, Locale::Fa);

    let decoded = ValidationErrors::decode(&errors.encode()).unwrap();
    assert_eq!(decoded, errors);
    assert!(decoded.get("phone").unwrap().contains("شماره موبایل"));
  }

  #[test]
  fn decode_rejects_non_map_payloads() {
    assert!(ValidationErrors::decode("plain diagnostic text").is_none());
    assert!(ValidationErrors::decode("[1,2,3]").is_none());
  }

  #[test]
  fn mobile_pattern_boundaries() {
    assert!(IRANIAN_MOBILE.is_match("09123456789"));
    assert!(!IRANIAN_MOBILE.is_match("9123456789"));
    assert!(!IRANIAN_MOBILE.is_match("091234567890"));
    assert!(!IRANIAN_MOBILE.is_match("08123456789"));
  }

  #[test]
  fn otp_pattern_boundaries() {
    assert!(OTP_CODE.is_match("123456"));
    assert!(!OTP_CODE.is_match("12345"));
    assert!(!OTP_CODE.is_match("12345a"));
  }

  #[test]
  fn field_map_for_phone_taken_uses_unique_template() {
    let errors = field_errors_for(&CoreError::PhoneAlreadyTaken, Locale::En).unwrap();
    assert_eq!(errors.get("phone").unwrap(), "phone has already been taken");
  }

  #[test]
  fn state_violations_carry_no_field_map() {
    assert!(field_errors_for(&CoreError::AccountSecurityAlreadyUnlocked, Locale::Fa).is_none());
  }
}
