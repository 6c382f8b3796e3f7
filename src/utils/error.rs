use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::models::FailureKind;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Invalid target price: {target} (must be greater than zero)")]
    InvalidTarget { target: Decimal },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

/// Failure raised by a [`PageFetcher`](crate::fetcher::PageFetcher).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("response body is not valid text: {0}")]
    Body(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Body(_) => FailureKind::ParseError,
            _ => FailureKind::FetchFailed,
        }
    }
}

/// Failure raised by an [`AlertDispatcher`](crate::notifiers::AlertDispatcher).
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid recipient: {0}")]
    Recipient(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_invalid_target_message() {
        let err = AppError::InvalidTarget {
            target: Decimal::ZERO,
        };
        assert_eq!(
            err.to_string(),
            "Invalid target price: 0 (must be greater than zero)"
        );
    }

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(
            FetchError::Status { status: 503 }.kind(),
            FailureKind::FetchFailed
        );
        assert_eq!(
            FetchError::Timeout(Duration::from_secs(1)).kind(),
            FailureKind::FetchFailed
        );
        assert_eq!(
            FetchError::Body("invalid utf-8".to_string()).kind(),
            FailureKind::ParseError
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = AppError::NotFound {
            resource: "watch".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: watch");
    }
}
