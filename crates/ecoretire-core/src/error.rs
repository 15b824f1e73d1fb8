use thiserror::Error;

/// Closed set of error kinds the service shell maps to HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    NotFound,
    RateLimited,
    ServiceUnavailable,
    Internal,
    DuplicateEvent,
    VerificationFailed,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("ledger rejected request: {0}")]
    LedgerFatal(String),

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("gateway rejected request: {0}")]
    GatewayFatal(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("session locked after too many attempts")]
    SessionLocked,

    #[error("batch execution blocked: {0}")]
    BatchBlocked(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::LedgerUnavailable(_) | CoreError::GatewayUnavailable(_) => {
                ErrorKind::ServiceUnavailable
            }
            CoreError::VerificationFailed(_) | CoreError::SessionLocked => {
                ErrorKind::VerificationFailed
            }
            CoreError::LedgerFatal(_)
            | CoreError::GatewayFatal(_)
            | CoreError::Storage(_)
            | CoreError::Serialization(_)
            | CoreError::BatchBlocked(_)
            | CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}
