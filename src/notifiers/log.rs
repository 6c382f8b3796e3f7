use async_trait::async_trait;
use uuid::Uuid;

use super::AlertDispatcher;
use crate::utils::error::DispatchError;

/// Dry-run dispatcher: writes the alert to the log instead of sending it.
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl LogDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<String, DispatchError> {
        let delivery_id = format!("log-{}", Uuid::new_v4().simple());
        tracing::info!(recipient, delivery_id = %delivery_id, "alert (dry run):\n{}", message);
        Ok(delivery_id)
    }
}
