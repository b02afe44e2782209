mod activity_repository;
mod repository;

pub use activity_repository::{
  SqlxUserActivityRepository, SqlxUserEventRepository, SqlxUserLogRepository,
};
pub use repository::{SqlxSettingsRepository, SqlxUserRepository};
