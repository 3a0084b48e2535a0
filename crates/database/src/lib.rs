pub mod error;
pub mod pool;
pub mod worker;

pub use error::DatabaseError;
pub use pool::{open, open_in_memory};
pub use worker::{into_task, DatabaseManagerHandler, SUBSCRIBED_TOPICS};
