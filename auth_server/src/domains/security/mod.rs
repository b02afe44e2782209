mod repository;
mod service;

pub use repository::{SqlxAccountSecurityRepository, SqlxOtpRepository};
pub use service::SecurityService;
