//! Error types for Cabeceo
//!
//! Infrastructure/transport failures live here. Lifecycle denials (the
//! per-transition rejection reasons) are a separate closed enum in
//! `crate::engine::denial` so that new reasons cannot silently fall
//! through to a default response class.

use hyper::StatusCode;

/// Main error type for Cabeceo operations
#[derive(Debug, thiserror::Error)]
pub enum CabeceoError {
    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CabeceoError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<std::io::Error> for CabeceoError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for Cabeceo operations
pub type Result<T> = std::result::Result<T, CabeceoError>;
