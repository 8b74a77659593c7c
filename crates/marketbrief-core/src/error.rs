use thiserror::Error;

/// Failure signal produced by a fetch closure.
///
/// Upstream providers fail in provider-specific ways (reset connections,
/// HTTP errors, malformed frames); adapters flatten all of them into a
/// message so the retry client can classify them in one place.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised by preference-store implementations.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference record is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown data source '{value}', expected one of eastmoney, sina, tushare")]
    UnknownSource { value: String },
}
