pub mod models;
pub mod pii;

pub use models::events::{BusDelayedEvent, Notification};
pub use pii::Masked;
