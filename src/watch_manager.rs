use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_retry::strategy::{jitter, FixedInterval};
use tokio_retry::Retry;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::extractor::{ExtractionResult, PriceExtractor};
use crate::fetcher::PageFetcher;
use crate::models::{FailureKind, NewWatch, Watch, WatchKey};
use crate::notifiers::AlertDispatcher;
use crate::store::{KeyedLeases, UpsertOutcome, WatchStore};
use crate::utils::error::{AppError, DispatchError, Result};

/// Outcome of one check cycle, relayed to an immediate caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchCheckResult {
    pub url: String,
    pub recipient: String,
    /// A price was obtained this cycle.
    pub checked: bool,
    pub price: Option<Decimal>,
    pub target_price: Decimal,
    /// The last known price is at or below target.
    pub triggered: bool,
    pub alerted: bool,
    pub reason: Option<FailureKind>,
    pub delivery_id: Option<String>,
    pub strategy: Option<String>,
    pub response_time_ms: u64,
}

impl WatchCheckResult {
    fn for_watch(watch: &Watch) -> Self {
        Self {
            url: watch.url.clone(),
            recipient: watch.recipient.clone(),
            checked: false,
            price: None,
            target_price: watch.target_price,
            triggered: false,
            alerted: false,
            reason: None,
            delivery_id: None,
            strategy: None,
            response_time_ms: 0,
        }
    }

    fn outcome_label(&self) -> &'static str {
        match (self.alerted, self.reason) {
            (true, _) => "alerted",
            (false, Some(kind)) => kind.as_str(),
            (false, None) => "checked",
        }
    }
}

const ALERT_SAVE_ATTEMPTS: usize = 3;
const ALERT_SAVE_DELAY_MS: u64 = 200;

/// A delivered alert whose `alert_already_sent` flag has not reached the store yet.
#[derive(Debug, Clone, Copy)]
struct UnsavedAlert {
    target_price: Decimal,
    sent_at: DateTime<Utc>,
}

/// Check coordinator: the only component that extracts prices and mutates a
/// watch's last known state.
pub struct WatchManager {
    store: WatchStore,
    leases: KeyedLeases,
    fetcher: Arc<dyn PageFetcher>,
    dispatcher: Arc<dyn AlertDispatcher>,
    extractor: PriceExtractor,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    dispatch_timeout: Duration,
    unsaved_alerts: Mutex<HashMap<WatchKey, UnsavedAlert>>,
}

impl WatchManager {
    pub fn new(
        store: WatchStore,
        fetcher: Arc<dyn PageFetcher>,
        dispatcher: Arc<dyn AlertDispatcher>,
        config: &AppConfig,
    ) -> Self {
        let scraper = &config.scraper;
        // Covers every retry attempt plus the pauses between them
        let attempts = scraper.retry_attempts + 1;
        let fetch_timeout = scraper.request_timeout() * attempts
            + Duration::from_millis(scraper.retry_delay_ms * u64::from(scraper.retry_attempts));

        Self {
            store,
            leases: KeyedLeases::new(),
            fetcher,
            dispatcher,
            extractor: PriceExtractor::new(scraper.price_bounds()),
            clock: Arc::new(SystemClock),
            fetch_timeout,
            dispatch_timeout: config.notifications.dispatch_timeout(),
            unsaved_alerts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeouts(mut self, fetch_timeout: Duration, dispatch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self.dispatch_timeout = dispatch_timeout;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &WatchStore {
        &self.store
    }

    pub fn leases(&self) -> &KeyedLeases {
        &self.leases
    }

    /// Validates and stores a watch request. Invalid targets never reach the
    /// check path.
    pub async fn register(&self, new_watch: NewWatch) -> Result<UpsertOutcome> {
        new_watch.validate()?;

        let key = new_watch.key();
        let _lease = self.leases.acquire(&key).await;
        self.store.upsert(new_watch, self.clock.now()).await
    }

    pub async fn get_watch(&self, key: &WatchKey) -> Result<Option<Watch>> {
        self.store.get(key).await
    }

    pub async fn list_watches(&self) -> Result<Vec<Watch>> {
        self.store.list_all().await
    }

    pub async fn remove_watch(&self, key: &WatchKey) -> Result<bool> {
        let _lease = self.leases.acquire(key).await;
        let removed = self.store.remove(key).await?;
        self.unsaved_alerts().remove(key);
        if removed {
            tracing::info!(%key, "watch removed");
        }
        Ok(removed)
    }

    /// Runs one fetch, extract, compare and maybe-alert pass for `key`.
    ///
    /// The key's lease is held for the whole cycle, so the alert decision
    /// and the `alert_already_sent` transition cannot interleave with another
    /// cycle on the same watch.
    pub async fn check_watch(&self, key: &WatchKey) -> Result<WatchCheckResult> {
        let start_time = Instant::now();
        let _lease = self.leases.acquire(key).await;

        let mut watch = self.store.get(key).await?.ok_or_else(|| AppError::NotFound {
            resource: format!("watch {}", key),
        })?;
        let mut result = WatchCheckResult::for_watch(&watch);
        let restored = self.restore_unsaved_alert(key, &mut watch);

        match self.fetch_and_extract(&watch.url).await {
            Err(kind) => {
                watch.record_failure(kind, self.clock.now());
                result.reason = Some(kind);
                tracing::warn!(url = %watch.url, recipient = %watch.recipient, reason = %kind, "check failed");
            }
            Ok(extraction) => {
                watch.record_price(extraction.price, self.clock.now());
                result.checked = true;
                result.price = Some(extraction.price);
                result.strategy = Some(extraction.strategy);
                tracing::info!(
                    url = %watch.url,
                    recipient = %watch.recipient,
                    price = %extraction.price,
                    target = %watch.target_price,
                    "price checked"
                );

                if watch.should_alert() {
                    match self.dispatch(&watch).await {
                        Ok(delivery_id) => {
                            watch.mark_alert_sent(self.clock.now());
                            result.alerted = true;
                            result.delivery_id = Some(delivery_id);
                            metrics::counter!("pricewatch_alerts_sent_total").increment(1);
                        }
                        Err(e) => {
                            watch.record_failure(FailureKind::DispatchFailed, self.clock.now());
                            result.reason = Some(FailureKind::DispatchFailed);
                            metrics::counter!("pricewatch_dispatch_failures_total").increment(1);
                            tracing::warn!(url = %watch.url, recipient = %watch.recipient, error = %e, "alert dispatch failed, will retry next cycle");
                        }
                    }
                }
            }
        }

        let alert_unsaved = result.alerted || restored;
        match self.save_state(&watch, alert_unsaved).await {
            Ok(()) => {
                if alert_unsaved {
                    self.unsaved_alerts().remove(key);
                }
            }
            Err(e) if alert_unsaved => {
                // The alert went out; keep the flag in memory so later cycles do not resend it
                tracing::error!(%key, error = %e, delivery_id = ?result.delivery_id, "failed to persist sent alert");
                if let Some(sent_at) = watch.last_alert_sent_at {
                    self.unsaved_alerts().insert(
                        key.clone(),
                        UnsavedAlert {
                            target_price: watch.target_price,
                            sent_at,
                        },
                    );
                }
            }
            Err(e) => {
                tracing::error!(%key, error = %e, "failed to persist check state");
                return Err(e);
            }
        }

        result.triggered = watch.is_target_met();
        result.response_time_ms = start_time.elapsed().as_millis() as u64;

        metrics::counter!("pricewatch_checks_total", "outcome" => result.outcome_label()).increment(1);
        metrics::histogram!("pricewatch_check_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());

        Ok(result)
    }

    fn unsaved_alerts(&self) -> std::sync::MutexGuard<'_, HashMap<WatchKey, UnsavedAlert>> {
        self.unsaved_alerts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reapplies a delivered-but-unsaved alert to `watch`. An entry for an
    /// older target is dropped, since re-targeting re-arms the watch.
    fn restore_unsaved_alert(&self, key: &WatchKey, watch: &mut Watch) -> bool {
        let mut unsaved = self.unsaved_alerts();
        let Some(alert) = unsaved.get(key).copied() else {
            return false;
        };
        if alert.target_price != watch.target_price {
            unsaved.remove(key);
            return false;
        }
        if !watch.alert_already_sent {
            watch.restore_alert_sent(alert.sent_at);
        }
        true
    }

    async fn save_state(&self, watch: &Watch, alert_unsaved: bool) -> Result<()> {
        if !alert_unsaved {
            return self.store.save_check_state(watch).await;
        }

        let strategy = FixedInterval::from_millis(ALERT_SAVE_DELAY_MS)
            .map(jitter)
            .take(ALERT_SAVE_ATTEMPTS - 1);
        Retry::start(strategy, || self.store.save_check_state(watch)).await
    }

    async fn fetch_and_extract(&self, url: &str) -> ExtractionResult {
        let html = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                tracing::debug!(url, error = %e, "page fetch failed");
                return Err(e.kind());
            }
            Err(_) => {
                tracing::warn!(url, timeout = ?self.fetch_timeout, "page fetch timed out");
                return Err(FailureKind::FetchFailed);
            }
        };

        self.extractor.extract(&html)
    }

    async fn dispatch(&self, watch: &Watch) -> std::result::Result<String, DispatchError> {
        let message = watch.alert_message();
        match tokio::time::timeout(
            self.dispatch_timeout,
            self.dispatcher.send(&watch.recipient, &message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.dispatch_timeout)),
        }
    }
}
