pub mod manager;
pub mod models;
pub mod relay;

pub use manager::ReservationLedger;
pub use models::ReservationRequest;
pub use relay::{DeliveryReport, NotificationRelay};
