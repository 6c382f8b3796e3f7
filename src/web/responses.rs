use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FailureKind;
use crate::scheduler::{CyclePhase, OneOffCheck};
use crate::utils::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
            timestamp: Utc::now(),
        }
    }
}

/// Error half of every handler's return type.
#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    UnprocessableEntity(String),
    InternalServerError(String),
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HttpError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            HttpError::BadRequest(_) => "BAD_REQUEST",
            HttpError::NotFound(_) => "NOT_FOUND",
            HttpError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            HttpError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            HttpError::BadRequest(msg)
            | HttpError::NotFound(msg)
            | HttpError::UnprocessableEntity(msg)
            | HttpError::InternalServerError(msg) => msg,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(format!("{} not found", resource.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiResponse::<()>::error(self.error_code(), self.message());
        (status, Json(body)).into_response()
    }
}

impl From<AppError> for HttpError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidTarget { .. } | AppError::InvalidUrl { .. } | AppError::Validation(_) => {
                HttpError::BadRequest(err.to_string())
            }
            AppError::NotFound { resource } => HttpError::not_found(resource),
            AppError::Parse { .. } => HttpError::UnprocessableEntity(err.to_string()),
            other => {
                tracing::error!(error = %other, "request failed");
                HttpError::internal("Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        HttpError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyStatus {
    /// An alert went out during this request.
    Sent,
    NotTriggered,
    /// Target met, but the alert for this target went out earlier.
    AlreadySent,
    Failed,
    Scheduled,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub status: NotifyStatus,
    pub price: Option<Decimal>,
    pub sid: Option<String>,
    pub triggered: bool,
    pub reason: Option<FailureKind>,
    pub job_id: Option<Uuid>,
    pub run_at: Option<DateTime<Utc>>,
}

impl From<OneOffCheck> for NotifyResponse {
    fn from(check: OneOffCheck) -> Self {
        match check {
            OneOffCheck::Completed(result) => {
                let status = if result.alerted {
                    NotifyStatus::Sent
                } else if result.reason.is_some() {
                    NotifyStatus::Failed
                } else if result.triggered {
                    NotifyStatus::AlreadySent
                } else {
                    NotifyStatus::NotTriggered
                };

                Self {
                    status,
                    price: result.price,
                    sid: result.delivery_id,
                    triggered: result.triggered,
                    reason: result.reason,
                    job_id: None,
                    run_at: None,
                }
            }
            OneOffCheck::Scheduled { job_id, run_at } => Self {
                status: NotifyStatus::Scheduled,
                price: None,
                sid: None,
                triggered: false,
                reason: None,
                job_id: Some(job_id),
                run_at: Some(run_at),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub scheduler: CyclePhase,
}
