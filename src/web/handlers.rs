use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use super::{ApiResponse, AppState, HealthResponse, HttpError, NotifyResponse};
use crate::models::{NewWatch, Watch, WatchKey};
use crate::notifiers::normalize_recipient;
use crate::utils::error::AppError;
use crate::scheduler::SchedulerStats;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotifyRequest {
    #[validate(url)]
    pub url: String,
    pub target_price: Decimal,
    #[serde(default)]
    #[validate(range(max = 1440))]
    pub delay_minutes: u64,
    pub send_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveWatchRequest {
    pub url: String,
    pub recipient: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedWatch {
    pub url: String,
    pub recipient: String,
    pub removed: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "pricewatch".to_string(),
        scheduler: state.scheduler.phase().await,
    }))
}

/// Registers (or re-targets) a watch and checks it now or after the delay.
pub async fn notify(
    State(state): State<AppState>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<NotifyResponse>>, HttpError> {
    let Json(request) = payload?;
    request.validate().map_err(AppError::from)?;

    let recipient = request
        .send_to
        .as_deref()
        .or(state.config.notifications.whatsapp.default_recipient.as_deref())
        .map(normalize_recipient)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| HttpError::bad_request("send_to is required when no default recipient is configured"))?;

    let outcome = state
        .manager
        .register(NewWatch {
            url: request.url.clone(),
            recipient,
            target_price: request.target_price,
        })
        .await?;

    tracing::info!(
        url = %request.url,
        target = %request.target_price,
        delay_minutes = request.delay_minutes,
        change = ?outcome.change,
        "notify request accepted"
    );

    let check = state
        .scheduler
        .check_once(outcome.watch.key(), Duration::from_secs(request.delay_minutes * 60))
        .await?;

    Ok(Json(ApiResponse::success(NotifyResponse::from(check))))
}

pub async fn list_watches(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Watch>>>, HttpError> {
    let watches = state.manager.list_watches().await?;
    Ok(Json(ApiResponse::success(watches)))
}

pub async fn remove_watch(
    State(state): State<AppState>,
    payload: Result<Json<RemoveWatchRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<RemovedWatch>>, HttpError> {
    let Json(request) = payload?;
    let key = WatchKey::new(request.url, normalize_recipient(&request.recipient));

    if !state.manager.remove_watch(&key).await? {
        return Err(HttpError::not_found("Watch"));
    }

    Ok(Json(ApiResponse::success(RemovedWatch {
        url: key.url,
        recipient: key.recipient,
        removed: true,
    })))
}

pub async fn scheduler_stats(State(state): State<AppState>) -> Json<ApiResponse<SchedulerStats>> {
    Json(ApiResponse::success(state.scheduler.stats().await))
}
