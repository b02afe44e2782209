pub mod events;
pub mod infrastructure;
pub mod repositories;

pub use events::*;
pub use infrastructure::*;
pub use repositories::*;
