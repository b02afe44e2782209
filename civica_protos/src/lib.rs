// Civica Protocol Buffers
//
// Schema registry for the fleet. Every service binds its handlers against
// the generated service types below and dials peers through the matching
// clients.

pub use prost;
pub use tonic;

pub mod civica {
  pub mod v1 {
    tonic::include_proto!("civica.v1");

    pub use self::{
      auth_service_client::AuthServiceClient,
      auth_service_server::{AuthService, AuthServiceServer},
      challenges_service_client::ChallengesServiceClient,
      challenges_service_server::{ChallengesService, ChallengesServiceServer},
      commercial_service_client::CommercialServiceClient,
      commercial_service_server::{CommercialService, CommercialServiceServer},
      features_service_client::FeaturesServiceClient,
      features_service_server::{FeaturesService, FeaturesServiceServer},
      levels_service_client::LevelsServiceClient,
      levels_service_server::{LevelsService, LevelsServiceServer},
      notifications_service_client::NotificationsServiceClient,
      notifications_service_server::{NotificationsService, NotificationsServiceServer},
    };
  }
}
