pub mod bus;
pub mod error;

pub use bus::{ServiceBus, DEFAULT_SUBSCRIBER_CAPACITY};
pub use error::BusError;
