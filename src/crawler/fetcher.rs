//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured identifier and timeout
//! - Pacing every attempt through the shared rate limiter
//! - Classifying failures as transient or permanent
//! - Retrying transient failures with exponential backoff
//! - Redirect handling (each hop is paced like any other request)

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::backoff::RetryPolicy;
use crate::crawler::rate_limiter::RateLimiter;
use crate::FailureKind;
use reqwest::{header::LOCATION, redirect::Policy, Client, Response, StatusCode};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed within one attempt
pub const MAX_REDIRECTS: usize = 10;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status_code: u16,

    /// Raw response body
    pub body: Vec<u8>,

    /// Attempts made, including the successful one
    pub attempts: u32,

    /// Transient failures that were retried before succeeding
    pub transient_failures: u32,
}

/// A fetch that failed for good, after any retries
#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: FailureKind,
    pub url: Url,
    /// HTTP status of the last attempt, if a response was received
    pub status_code: Option<u16>,
    pub message: String,
    pub attempts: u32,
    /// Transient failures seen across all attempts
    pub transient_failures: u32,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure fetching {} after {} attempt(s): {}",
            self.kind, self.url, self.attempts, self.message
        )
    }
}

impl std::error::Error for FetchError {}

/// Outcome of a single attempt
struct AttemptFailure {
    kind: FailureKind,
    status_code: Option<u16>,
    message: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The client identification configuration
/// * `timeout` - Upper bound for a single request attempt
///
/// # Example
///
/// ```no_run
/// use listing_harvester::config::UserAgentConfig;
/// use listing_harvester::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "ListingHarvester".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     browser_string: None,
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .redirect(Policy::none()) // Handle redirects manually
        .build()
}

/// Classifies an HTTP status code
///
/// # Retry Logic
///
/// | Condition | Classification |
/// |-----------|----------------|
/// | 2xx | success (`None`) |
/// | HTTP 429 | Transient |
/// | HTTP 5xx | Transient |
/// | Other 4xx | Permanent |
/// | Anything else | Permanent |
pub fn classify_status(status: StatusCode) -> Option<FailureKind> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(FailureKind::Transient)
    } else {
        Some(FailureKind::Permanent)
    }
}

/// Classifies a request-level error (no usable response)
///
/// Timeouts, connection failures and interrupted bodies are transient;
/// invalid requests and redirect-policy violations are permanent.
pub fn classify_error(error: &reqwest::Error) -> FailureKind {
    if error.is_builder() || error.is_redirect() {
        FailureKind::Permanent
    } else {
        FailureKind::Transient
    }
}

/// Fetches pages through the shared rate limiter with retry and backoff
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            policy,
        }
    }

    /// Builds a fetcher from crawler and client configuration
    pub fn from_config(
        crawler: &CrawlerConfig,
        user_agent: &UserAgentConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            user_agent,
            Duration::from_secs(crawler.request_timeout_secs),
        )?;
        Ok(Self::new(client, limiter, RetryPolicy::from_config(crawler)))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// Every attempt, retries included, first acquires a rate-limiter permit,
    /// and so does every redirect hop within an attempt. A redirect loop, a
    /// chain longer than [`MAX_REDIRECTS`] or a redirect without a usable
    /// `Location` is permanent.
    /// Permanent failures return immediately; transient failures are retried
    /// up to the policy's attempt limit, waiting `base * 2^n` (capped) between
    /// attempts, and then returned as a transient `FetchError`.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut attempts = 0;
        let mut transient_failures = 0;

        loop {
            attempts += 1;
            self.limiter.acquire().await;
            tracing::debug!("GET {} (attempt {})", url, attempts);

            let failure = match self.attempt(url).await {
                Ok((final_url, status_code, body)) => {
                    return Ok(FetchedPage {
                        final_url,
                        status_code,
                        body,
                        attempts,
                        transient_failures,
                    });
                }
                Err(failure) => failure,
            };

            if failure.kind == FailureKind::Transient {
                transient_failures += 1;
            }

            if failure.kind == FailureKind::Permanent || !self.policy.allows_retry(attempts) {
                return Err(FetchError {
                    kind: failure.kind,
                    url: url.clone(),
                    status_code: failure.status_code,
                    message: failure.message,
                    attempts,
                    transient_failures,
                });
            }

            let delay = self.policy.delay(attempts - 1);
            tracing::debug!(
                "Transient failure for {} ({}), retrying in {:?}",
                url,
                failure.message,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, url: &Url) -> Result<(Url, u16, Vec<u8>), AttemptFailure> {
        let mut current = url.clone();
        let mut visited = HashSet::new();
        visited.insert(current.clone());

        loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| AttemptFailure {
                    kind: classify_error(&e),
                    status_code: None,
                    message: describe_error(&e),
                })?;

            let status = response.status();
            if status.is_redirection() {
                let target = redirect_target(&response, &current)?;

                if visited.len() > MAX_REDIRECTS {
                    return Err(AttemptFailure {
                        kind: FailureKind::Permanent,
                        status_code: Some(status.as_u16()),
                        message: format!("More than {} redirects", MAX_REDIRECTS),
                    });
                }
                if !visited.insert(target.clone()) {
                    return Err(AttemptFailure {
                        kind: FailureKind::Permanent,
                        status_code: Some(status.as_u16()),
                        message: format!("Redirect loop at {}", target),
                    });
                }

                self.limiter.acquire().await;
                tracing::debug!("Redirect {} -> {}", current, target);
                current = target;
                continue;
            }

            if let Some(kind) = classify_status(status) {
                return Err(AttemptFailure {
                    kind,
                    status_code: Some(status.as_u16()),
                    message: format!("HTTP {}", status.as_u16()),
                });
            }

            let body = response.bytes().await.map_err(|e| AttemptFailure {
                kind: FailureKind::Transient,
                status_code: Some(status.as_u16()),
                message: format!("reading body: {}", describe_error(&e)),
            })?;

            return Ok((current, status.as_u16(), body.to_vec()));
        }
    }
}

/// Resolves a redirect's `Location` header against the URL that returned it
fn redirect_target(response: &Response, base: &Url) -> Result<Url, AttemptFailure> {
    let status_code = Some(response.status().as_u16());
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AttemptFailure {
            kind: FailureKind::Permanent,
            status_code,
            message: format!("HTTP {} without Location", response.status().as_u16()),
        })?;

    base.join(location)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
        .ok_or_else(|| AttemptFailure {
            kind: FailureKind::Permanent,
            status_code,
            message: format!("Unusable redirect target '{}'", location),
        })
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    }
}
