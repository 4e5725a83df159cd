//! Error types for weedfiler

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Master Connectivity Errors ===
    #[error("No master node available")]
    NoMasterAvailable,

    #[error("Health check failed on {addr}: {reason}")]
    ProbeFailed { addr: String, reason: String },

    // === Metadata Errors ===
    #[error("Failed to construct metadata backend: {0}")]
    BackendConstructionFailed(String),

    #[error("Operation not supported by this backend: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Security Errors ===
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::UnsupportedOperation(_) => StatusCode::NOT_IMPLEMENTED,
            Error::InvalidConfig(_) | Error::InvalidPath(_) | Error::DirectoryNotEmpty(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::NoMasterAvailable | Error::ProbeFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            Error::NotFound("/a".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::UnsupportedOperation("move").to_http_status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            Error::Unauthorized("no token".into()).to_http_status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
