// Integration tests for PriceWatch
// Components are wired together the way `main` does, with the network
// collaborators replaced by in-process fakes.

pub mod api_tests;
pub mod scheduler_tests;
pub mod watch_lifecycle_tests;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use pricewatch::{
    web::{create_router, AppState},
    AlertDispatcher, AppConfig, DispatchError, FetchError, NewWatch, PageFetcher,
    RecheckScheduler, WatchKey, WatchManager, WatchStore,
};

pub const RECIPIENT: &str = "whatsapp:+15550001111";

pub fn product_page(price: &str) -> String {
    format!(
        r#"<html><head><title>Widget</title></head>
        <body><div class="product"><span id="priceblock_ourprice">${}</span></div></body></html>"#,
        price
    )
}

/// Serves scripted pages per URL, optionally after a delay.
#[derive(Default)]
pub struct FakePageFetcher {
    pages: Mutex<HashMap<String, std::result::Result<String, u16>>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl FakePageFetcher {
    pub fn set_price(&self, url: &str, price: &str) {
        self.set_html(url, product_page(price));
    }

    pub fn set_html(&self, url: &str, html: String) {
        self.pages.lock().unwrap().insert(url.to_string(), Ok(html));
    }

    pub fn set_status(&self, url: &str, status: u16) {
        self.pages.lock().unwrap().insert(url.to_string(), Err(status));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakePageFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some(Ok(html)) => Ok(html),
            Some(Err(status)) => Err(FetchError::Status { status }),
            None => Err(FetchError::Status { status: 404 }),
        }
    }
}

/// Records every alert; can be told to fail the next N sends.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(String, String)>>,
    failures_left: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn fail_next(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, recipient: &str, message: &str) -> std::result::Result<String, DispatchError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DispatchError::Rejected {
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient.to_string(), message.to_string()));
        Ok(format!("SM{:04}", sent.len()))
    }
}

pub struct TestHarness {
    pub config: AppConfig,
    pub fetcher: Arc<FakePageFetcher>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub manager: Arc<WatchManager>,
    pub scheduler: Arc<RecheckScheduler>,
}

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.scheduler.max_concurrent_checks = 4;
    config.notifications.dispatch_timeout = 2;
    config.notifications.whatsapp.default_recipient = Some(RECIPIENT.to_string());
    config
}

pub async fn create_harness() -> anyhow::Result<TestHarness> {
    let config = get_test_config();
    let fetcher = Arc::new(FakePageFetcher::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let store = WatchStore::in_memory().await?;
    let manager = Arc::new(WatchManager::new(
        store,
        fetcher.clone(),
        dispatcher.clone(),
        &config,
    ));
    let scheduler = Arc::new(RecheckScheduler::new(manager.clone(), &config.scheduler));

    Ok(TestHarness {
        config,
        fetcher,
        dispatcher,
        manager,
        scheduler,
    })
}

impl TestHarness {
    pub fn app_state(&self) -> AppState {
        AppState {
            manager: self.manager.clone(),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
        }
    }

    pub async fn watch(&self, url: &str, target: &str) -> anyhow::Result<WatchKey> {
        let outcome = self
            .manager
            .register(NewWatch {
                url: url.to_string(),
                recipient: RECIPIENT.to_string(),
                target_price: target.parse()?,
            })
            .await?;
        Ok(outcome.watch.key())
    }
}

/// Helper to make HTTP requests to the test app
pub async fn make_request(
    state: AppState,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> anyhow::Result<(axum::http::StatusCode, serde_json::Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = request.body(Body::from(
        body.map(|b| b.to_string()).unwrap_or_default(),
    ))?;

    let response: Response = create_router(state).oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, json))
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
