use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tokio_retry::strategy::{jitter, FixedInterval};
use tokio_retry::RetryIf;

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, FetchError};

/// Source of raw page HTML.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            FetchError::Body(_) | FetchError::Timeout(_) => false,
        }
    }
}

/// Plain HTTP fetcher with a browser-like user agent and bounded retries.
pub struct HttpPageFetcher {
    client: Client,
    retry_attempts: u32,
    retry_delay_ms: u64,
}

impl HttpPageFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_document_type(content_type) {
                return Err(FetchError::Body(format!(
                    "unsupported content type {}",
                    content_type
                )));
            }
        }

        Ok(response.text().await?)
    }
}

fn is_document_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let strategy = FixedInterval::from_millis(self.retry_delay_ms)
            .map(jitter)
            .take(self.retry_attempts as usize);

        let result = RetryIf::start(
            strategy,
            || self.fetch_once(url),
            |e: &FetchError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::debug!(url, error = %e, "retrying page fetch");
                }
                retry
            },
        )
        .await;

        if let Err(e) = &result {
            tracing::warn!(url, error = %e, "page fetch failed");
        }
        result
    }
}
