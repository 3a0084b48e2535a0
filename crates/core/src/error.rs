use thiserror::Error;

/// Top-level error taxonomy (§7, classes 4-5). Classes 1-3 (transient network failure,
/// per-coin failure, handler exception) are local to the Data Fetcher / Worker Base and
/// never reach this type — they are swallowed into per-coin outcome events or log lines.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Class 5: detected before any worker starts. Exit code 1.
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// Class 4: an unrecoverable state inside a worker. Triggers orderly shutdown,
    /// exit code 1.
    #[error("worker '{worker}' failed: {reason}")]
    WorkerFatal { worker: String, reason: String },
}

impl AnalysisError {
    #[must_use]
    pub fn worker_fatal(worker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WorkerFatal {
            worker: worker.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code mandated by §6: 1 for every variant of this type, 0 otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
