use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::FailureKind;
use crate::utils::error::AppError;

/// Composite identity of a watch. The same URL may be tracked for several
/// recipients independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchKey {
    pub url: String,
    pub recipient: String,
}

impl WatchKey {
    pub fn new(url: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            recipient: recipient.into(),
        }
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.url, self.recipient)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Watch {
    pub url: String,
    pub recipient: String,
    pub target_price: Decimal,

    // Last known state, written only by check cycles
    pub last_price: Option<Decimal>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_alert_sent_at: Option<DateTime<Utc>>,
    pub alert_already_sent: bool,
    pub last_failure: Option<FailureKind>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWatch {
    pub url: String,
    pub recipient: String,
    pub target_price: Decimal,
}

impl NewWatch {
    pub fn key(&self) -> WatchKey {
        WatchKey::new(self.url.clone(), self.recipient.clone())
    }

    /// Rejects non-positive targets, non-http(s) URLs and blank recipients.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.target_price <= Decimal::ZERO {
            return Err(AppError::InvalidTarget {
                target: self.target_price,
            });
        }

        match url::Url::parse(&self.url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(AppError::InvalidUrl {
                    url: self.url.clone(),
                })
            }
        }

        if self.recipient.trim().is_empty() {
            return Err(AppError::Validation("Recipient is required".to_string()));
        }

        Ok(())
    }
}

impl Watch {
    pub fn new(new_watch: NewWatch, now: DateTime<Utc>) -> Self {
        Self {
            url: new_watch.url,
            recipient: new_watch.recipient,
            target_price: new_watch.target_price,
            last_price: None,
            last_checked_at: None,
            last_alert_sent_at: None,
            alert_already_sent: false,
            last_failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> WatchKey {
        WatchKey::new(self.url.clone(), self.recipient.clone())
    }

    /// Applies a new target. Returns true (and re-arms) only when the value
    /// actually changed.
    pub fn retarget(&mut self, target_price: Decimal, now: DateTime<Utc>) -> bool {
        if self.target_price == target_price {
            return false;
        }

        self.target_price = target_price;
        self.alert_already_sent = false;
        self.updated_at = now;
        true
    }

    pub fn record_price(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.last_price = Some(price);
        self.last_checked_at = Some(now);
        self.last_failure = None;
        self.updated_at = now;
    }

    /// Records a failed cycle. The last known price is left untouched.
    pub fn record_failure(&mut self, kind: FailureKind, now: DateTime<Utc>) {
        self.last_checked_at = Some(now);
        self.last_failure = Some(kind);
        self.updated_at = now;
    }

    pub fn is_target_met(&self) -> bool {
        self.last_price
            .map(|price| price <= self.target_price)
            .unwrap_or(false)
    }

    pub fn should_alert(&self) -> bool {
        !self.alert_already_sent && self.is_target_met()
    }

    pub fn mark_alert_sent(&mut self, now: DateTime<Utc>) {
        debug_assert!(self.is_target_met());
        self.alert_already_sent = true;
        self.last_alert_sent_at = Some(now);
        self.updated_at = now;
    }

    /// Reinstates an alert that was delivered at `sent_at` but never stored.
    pub fn restore_alert_sent(&mut self, sent_at: DateTime<Utc>) {
        self.alert_already_sent = true;
        self.last_alert_sent_at = Some(sent_at);
    }

    pub fn alert_message(&self) -> String {
        let price = self
            .last_price
            .map(|p| p.normalize().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Price alert for {}\nCurrent price: {}\nTarget: {}\nTriggered: {}",
            self.url,
            price,
            self.target_price.normalize(),
            if self.is_target_met() { "yes" } else { "no" }
        )
    }
}
