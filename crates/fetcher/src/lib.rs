pub mod retry;
pub mod worker;

pub use retry::RetryPolicy;
pub use worker::{into_task, DataFetcherHandler, FetcherTask, SUBSCRIBED_TOPICS};
