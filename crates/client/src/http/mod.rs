//! HTTP page transport.
//!
//! Fetches raw pages from a JSON endpoint with rate limiting and status mapping.
//!
//! ### Protocol
//!
//! - **Request**: `GET {endpoint}?{params}&{page_param}={id}&{page_size_param}={n}`
//!   where `params` are the encoded values of the parameters that are set.
//! - **Authentication**: optional API key header (default `X-Api-Key`).
//! - **Response**: JSON object with `items`, `pageId` and `isLastPage`. The body is
//!   handed to the core undecoded; shape checks happen there.
//! - **Rate limiting**: optional minimum interval between requests.
//! - **Retries**: transient failures (429, 5xx, timeouts, network errors) are
//!   retried with exponential backoff, up to `max_retries` times.

pub mod error;
pub mod request;

pub use error::HttpError;
pub use request::build_url;

use async_trait::async_trait;
use reqwest::{StatusCode, header};
use serde_json::Value;
use sift_core::{AppConfig, BoxError, PageQuery, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "sift/0.1";

/// Default number of retries after a transient failure.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first retry; doubled for each further one.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Collection endpoint, e.g. `https://api.example.com/items`.
    pub endpoint: String,
    /// API key, sent in `api_key_header` when set.
    pub api_key: Option<String>,
    pub api_key_header: String,
    /// Request timeout (default: 10s).
    pub timeout: Duration,
    pub user_agent: String,
    /// Query parameter carrying the page id (default: `page`).
    pub page_param: String,
    /// Query parameter carrying the page size (default: `pageSize`).
    pub page_size_param: String,
    /// Minimum spacing between requests (default: none).
    pub min_request_interval: Duration,
    /// Honour HTTP(S)_PROXY from the environment (default: true).
    pub use_system_proxy: bool,
    /// Retries after a transient failure (default: 2).
    pub max_retries: u32,
    /// Delay before the first retry (default: 250ms).
    pub retry_backoff: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            api_key_header: "X-Api-Key".to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_param: "page".to_string(),
            page_size_param: "pageSize".to_string(),
            min_request_interval: Duration::ZERO,
            use_system_proxy: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl HttpConfig {
    /// Take endpoint, credentials, timeout and rate limit from application config.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, HttpError> {
        let endpoint = config.require_endpoint().map_err(|_| HttpError::MissingEndpoint)?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            min_request_interval: config.min_request_interval(),
            ..Default::default()
        })
    }
}

/// Rate limiter to enforce request intervals.
#[derive(Debug)]
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self { last_request: Mutex::new(None), min_interval }
    }

    /// Acquire permission to make a request, waiting if necessary.
    async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Page transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: HttpConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpTransport {
    /// Create a transport; the endpoint is validated up front.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        if config.endpoint.trim().is_empty() {
            return Err(HttpError::MissingEndpoint);
        }
        let probe = PageQuery { params: Default::default(), page_id: 1, page_size: 1 };
        build_url(&config.endpoint, &probe, &config.page_param, &config.page_size_param)?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder.build().map_err(|e| HttpError::Network(Arc::new(e)))?;

        let rate_limiter = Arc::new(RateLimiter::new(config.min_request_interval));
        Ok(Self { http, config, rate_limiter })
    }

    /// Create a transport from application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, HttpError> {
        Self::new(HttpConfig::from_app_config(config)?)
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Fetch one raw page, retrying transient failures.
    pub async fn fetch(&self, query: &PageQuery) -> Result<Value, HttpError> {
        let url = build_url(&self.config.endpoint, query, &self.config.page_param, &self.config.page_size_param)?;

        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(query, url.clone()).await {
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff.saturating_mul(1 << attempt.min(16));
                    attempt += 1;
                    tracing::debug!(page_id = query.page_id, attempt, error = %err, ?delay, "retrying page fetch");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn fetch_once(&self, query: &PageQuery, url: Url) -> Result<Value, HttpError> {
        self.rate_limiter.acquire().await;

        let start = Instant::now();
        tracing::debug!(page_id = query.page_id, url = %url, "fetching page");

        let mut request = self.http.get(url).header(header::ACCEPT, "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header(self.config.api_key_header.as_str(), key);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(page_id = query.page_id, status = %status, "page response");

        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| HttpError::Parse(e.to_string()))?;

        tracing::debug!(page_id = query.page_id, bytes = bytes.len(), elapsed = ?start.elapsed(), "page fetched");

        Ok(body)
    }
}

/// Map an unsuccessful status to an error.
fn classify_status(status: StatusCode) -> Option<HttpError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(HttpError::AuthError),
        StatusCode::TOO_MANY_REQUESTS => Some(HttpError::RateLimited),
        s if s.is_client_error() || s.is_server_error() => Some(HttpError::Http { status: s.as_u16() }),
        _ => None,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, BoxError> {
        self.fetch(query).await.map_err(BoxError::from)
    }
}
