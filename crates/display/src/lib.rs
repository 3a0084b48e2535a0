pub mod worker;

pub use worker::{into_task, DisplayAgentHandler, DisplayTask, SUBSCRIBED_TOPICS};
