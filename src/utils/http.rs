//! HTTP fetching with retry, backoff and endpoint fallback.

use reqwest::{Client, StatusCode};
use std::sync::Mutex;
use std::time::Duration;

use crate::sources::SourceError;
use crate::utils::retry::{with_retry, RetryConfig, TransientError};

/// Default user agent, `<crate>/<version>`
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Transport settings for a [`RetryingFetcher`]
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Value for the `Accept` header, if any
    pub accept: Option<String>,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            accept: None,
        }
    }
}

/// Fetches raw payloads from a provider, retrying transient failures and
/// falling back to secondary endpoints once the primary is exhausted.
///
/// The underlying client lives until [`RetryingFetcher::close`] is called;
/// fetching after that fails with [`SourceError::Closed`].
#[derive(Debug)]
pub struct RetryingFetcher {
    label: String,
    endpoints: Vec<String>,
    retry: RetryConfig,
    accept: Option<String>,
    client: Mutex<Option<Client>>,
}

impl RetryingFetcher {
    pub fn new(
        label: impl Into<String>,
        endpoints: Vec<String>,
        retry: RetryConfig,
        options: FetcherOptions,
    ) -> Result<Self, SourceError> {
        if endpoints.is_empty() {
            return Err(SourceError::InvalidRequest(
                "at least one endpoint is required".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            label: label.into(),
            endpoints,
            retry,
            accept: options.accept,
            client: Mutex::new(Some(client)),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Fetch one page. `params` are sent as the query string.
    pub async fn fetch(&self, params: &[(String, String)]) -> Result<String, SourceError> {
        let client = self.client()?;
        let mut last_error = None;

        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            let result = with_retry(self.retry, || self.fetch_once(&client, endpoint, params)).await;

            match result {
                Ok(body) => {
                    if idx > 0 {
                        tracing::info!("{}: fallback endpoint {} succeeded", self.label, endpoint);
                    }
                    return Ok(body);
                }
                Err(e) if TransientError::from_source_error(&e).is_some() => {
                    tracing::warn!(
                        "{}: endpoint {} exhausted after {} attempts: {}",
                        self.label,
                        endpoint,
                        self.retry.max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last = last_error
            .unwrap_or_else(|| SourceError::Other("no endpoint was attempted".to_string()));
        Err(SourceError::RetriesExhausted {
            attempts: self.retry.max_attempts.saturating_mul(self.endpoints.len() as u32),
            last: Box::new(last),
        })
    }

    async fn fetch_once(
        &self,
        client: &Client,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<String, SourceError> {
        let mut request = client.get(endpoint).query(params);
        if let Some(accept) = &self.accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }

        tracing::debug!("{}: GET {} {:?}", self.label, endpoint, params);
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimit);
        }
        if TransientError::RETRYABLE_STATUS.contains(&status.as_u16()) {
            return Err(SourceError::Server(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(200).collect();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }

    fn client(&self) -> Result<Client, SourceError> {
        let guard = self
            .client
            .lock()
            .map_err(|_| SourceError::Other("HTTP client lock poisoned".to_string()))?;
        guard.clone().ok_or(SourceError::Closed)
    }

    /// Release the HTTP client. Safe to call more than once.
    pub fn close(&self) -> Result<(), SourceError> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| SourceError::Other("HTTP client lock poisoned".to_string()))?;
        if guard.take().is_some() {
            tracing::debug!("{}: HTTP client closed", self.label);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.client.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}
