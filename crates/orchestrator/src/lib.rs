pub mod analysis_job;
pub mod correlation;
pub mod low_cap;
pub mod worker;

pub use analysis_job::{AnalysisJob, JobOutcome};
pub use worker::{into_task, OrchestratorHandler, DATABASE_WORKER_NAME, SUBSCRIBED_TOPICS};
