pub mod event_publisher;
pub mod peer_clients;
pub mod sms;

pub use event_publisher::EventPublisher;
pub use peer_clients::PeerClients;
pub use sms::PeerSmsSender;
