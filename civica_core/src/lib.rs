pub mod contracts;
pub mod error;
pub mod models;
pub mod validation;

pub use error::CoreError;
pub use models::*;
pub use validation::{Locale, MessageTemplate, ValidationErrors};
