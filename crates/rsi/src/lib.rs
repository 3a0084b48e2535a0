pub mod calculator;
pub mod worker;

pub use calculator::calculate;
pub use worker::{into_task, RsiCalculatorHandler, RsiTask, SUBSCRIBED_TOPICS};
