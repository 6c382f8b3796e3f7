use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{normalize_recipient, AlertDispatcher};
use crate::config::NotificationsConfig;
use crate::utils::error::{AppError, DispatchError};

/// Sends alerts as WhatsApp messages through the Twilio Messages REST API.
pub struct WhatsAppDispatcher {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

impl WhatsAppDispatcher {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: &str,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: normalize_recipient(from_number),
            api_base: api_base.into(),
        }
    }

    pub fn from_config(config: &NotificationsConfig) -> Result<Self, AppError> {
        let whatsapp = &config.whatsapp;
        let missing = |field: &str| AppError::Validation(format!("WhatsApp {} is not configured", field));

        let account_sid = whatsapp.account_sid.clone().ok_or_else(|| missing("account_sid"))?;
        let auth_token = whatsapp.auth_token.clone().ok_or_else(|| missing("auth_token"))?;
        let from_number = whatsapp.from_number.as_deref().ok_or_else(|| missing("from_number"))?;

        let client = Client::builder()
            .timeout(config.dispatch_timeout())
            .build()?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            from_number: normalize_recipient(from_number),
            api_base: whatsapp.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl AlertDispatcher for WhatsAppDispatcher {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<String, DispatchError> {
        let to = normalize_recipient(recipient);
        if to.is_empty() {
            return Err(DispatchError::Recipient("recipient is empty".to_string()));
        }

        let params = [
            ("From", self.from_number.as_str()),
            ("To", to.as_str()),
            ("Body", message),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(recipient = %to, status = status.as_u16(), "WhatsApp message rejected: {}", message);
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessageResponse = response.json().await?;
        tracing::info!(recipient = %to, sid = %body.sid, "WhatsApp alert sent");
        Ok(body.sid)
    }
}
