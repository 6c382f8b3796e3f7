// Alert dispatcher implementations
pub mod log;
pub mod whatsapp;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::NotificationsConfig;
use crate::utils::error::{AppError, DispatchError};

pub use log::LogDispatcher;
pub use whatsapp::WhatsAppDispatcher;

/// Outbound channel for price alerts. Returns the provider's delivery id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, recipient: &str, message: &str) -> Result<String, DispatchError>;
}

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Canonical form of a WhatsApp address (`whatsapp:+15551234567`).
pub fn normalize_recipient(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with(WHATSAPP_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, trimmed)
    }
}

/// WhatsApp when credentials are configured, otherwise a dry-run logger.
pub fn build_dispatcher(config: &NotificationsConfig) -> Result<Arc<dyn AlertDispatcher>, AppError> {
    if config.whatsapp.is_configured() {
        Ok(Arc::new(WhatsAppDispatcher::from_config(config)?))
    } else {
        tracing::warn!("WhatsApp credentials missing; alerts will only be logged");
        Ok(Arc::new(LogDispatcher::new()))
    }
}
