use thiserror::Error;

/// Errors surfaced by the exchange/market-list HTTP clients. The Data Fetcher inspects
/// `is_transient` to decide whether a failure belongs to error class 1 (retry) or should be
/// surfaced immediately as a per-coin failure (class 2).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("response could not be parsed: {0}")]
    Deserialization(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
}

impl FetchError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Deserialization(_) | Self::SymbolNotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if let Some(status) = err.status() {
            Self::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = FetchError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = FetchError::Api {
            status: 404,
            message: "not found".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn symbol_not_found_is_not_transient() {
        assert!(!FetchError::SymbolNotFound("ABC/USDC".to_string()).is_transient());
    }
}
