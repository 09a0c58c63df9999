//! Resilient request executor: retry, backoff, and auth on top of the
//! rate governor.

use crate::auth::Authenticator;
use crate::config::RateConfig;
use crate::governor::RateGovernor;
use crate::model::RequestStats;
use crate::traits::{ApiRequest, ApiResponse, HarvestError, HttpTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Default)]
struct StatsCounters {
    total: AtomicU64,
    successful: AtomicU64,
    rate_limited: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    rate_limit_wait_ms: AtomicU64,
}

/// Wraps one HTTP call with the full recovery policy.
///
/// Every attempt consumes the governor first, so retries are rate-governed
/// like first attempts. 429 and 5xx (and network-level failures) retry with
/// capped exponential backoff; an explicit `Retry-After` from the provider
/// takes precedence over the computed delay. Other 4xx fail immediately.
/// A single 401 triggers one transparent token refresh.
///
/// Responses advertising a nearly depleted quota (`X-RateLimit-Remaining`
/// ≤ 1) defer the next request until the advertised window reset, ahead of
/// any 429 ever being served.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    governor: RateGovernor,
    auth: Authenticator,
    config: RateConfig,
    token: RwLock<Option<String>>,
    pause_until: Mutex<Option<Instant>>,
    stats: StatsCounters,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Authenticator,
        config: RateConfig,
    ) -> Self {
        Self {
            governor: RateGovernor::new(&config),
            transport,
            auth,
            config,
            token: RwLock::new(None),
            pause_until: Mutex::new(None),
            stats: StatsCounters::default(),
        }
    }

    /// Fetches the initial bearer token. Failure here is fatal to the run.
    pub async fn authenticate(&self) -> Result<(), HarvestError> {
        let token = self.auth.fetch_token().await?;
        *self.token.write().await = Some(token);
        Ok(())
    }

    /// Executes one request to completion under the recovery policy.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, HarvestError> {
        let mut backoff = self.config.initial_backoff;
        let mut refreshed_auth = false;
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
            }
            self.wait_for_quota_window().await;
            self.governor.acquire().await;
            self.stats.total.fetch_add(1, Ordering::Relaxed);

            let mut attempt_request = request.clone();
            if let Some(token) = self.token.read().await.as_deref() {
                attempt_request =
                    attempt_request.with_header("Authorization", format!("Bearer {token}"));
            }

            let outcome = self.transport.send(&attempt_request).await;
            if let Ok(response) = &outcome {
                self.note_quota_headers(response).await;
            }

            match outcome {
                Ok(response) if response.is_success() => {
                    self.stats.successful.fetch_add(1, Ordering::Relaxed);
                    return Ok(response);
                }
                Ok(response) if response.status == 429 => {
                    self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
                    if attempt < self.config.max_retries {
                        // Provider-supplied Retry-After wins over computed backoff.
                        let wait = response
                            .retry_after()
                            .map(Duration::from_secs)
                            .unwrap_or(backoff);
                        warn!(
                            url = %request.url,
                            attempt = attempt + 1,
                            wait_secs = wait.as_secs_f64(),
                            "rate limited, backing off"
                        );
                        self.stats
                            .rate_limit_wait_ms
                            .fetch_add(wait.as_millis() as u64, Ordering::Relaxed);
                        sleep(wait).await;
                        backoff = (backoff * 2).min(self.config.max_backoff);
                        attempt += 1;
                        continue;
                    }
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(HarvestError::RateLimitExceeded {
                        status: 429,
                        attempts: attempt + 1,
                    });
                }
                Ok(response) if response.status == 401 && !refreshed_auth => {
                    // Auth-expired: one refresh, one retry. A second 401 falls
                    // through to RequestRejected below.
                    warn!(url = %request.url, "401 mid-run, refreshing token");
                    refreshed_auth = true;
                    match self.auth.fetch_token().await {
                        Ok(fresh) => {
                            *self.token.write().await = Some(fresh);
                            attempt += 1;
                            continue;
                        }
                        Err(_) => {
                            self.stats.failed.fetch_add(1, Ordering::Relaxed);
                            return Err(HarvestError::RequestRejected {
                                status: 401,
                                url: request.url.clone(),
                            });
                        }
                    }
                }
                Ok(response) if (500..600).contains(&response.status) => {
                    if attempt < self.config.max_retries {
                        warn!(
                            url = %request.url,
                            status = response.status,
                            attempt = attempt + 1,
                            "server error, retrying"
                        );
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(self.config.max_backoff);
                        attempt += 1;
                        continue;
                    }
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(HarvestError::UpstreamUnavailable {
                        last_status: Some(response.status),
                        attempts: attempt + 1,
                    });
                }
                Ok(response) => {
                    // Remaining 4xx: the condition will not self-resolve.
                    debug!(url = %request.url, status = response.status, "request rejected");
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(HarvestError::RequestRejected {
                        status: response.status,
                        url: request.url.clone(),
                    });
                }
                Err(failure) => {
                    // Network-level failure: transient, same policy as 5xx.
                    if attempt < self.config.max_retries {
                        warn!(
                            url = %request.url,
                            error = %failure,
                            attempt = attempt + 1,
                            "transport failure, retrying"
                        );
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(self.config.max_backoff);
                        attempt += 1;
                        continue;
                    }
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(HarvestError::UpstreamUnavailable {
                        last_status: None,
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }

    /// Sleeps out a previously advertised quota-window reset, if one is
    /// pending.
    async fn wait_for_quota_window(&self) {
        let deadline = self.pause_until.lock().await.take();
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if deadline > now {
                warn!(
                    wait_secs = (deadline - now).as_secs_f64(),
                    "quota window nearly exhausted, waiting for reset"
                );
                sleep_until(deadline).await;
            }
        }
    }

    /// Records the provider's quota headers; a nearly depleted window defers
    /// the next request until the advertised reset.
    async fn note_quota_headers(&self, response: &ApiResponse) {
        let (Some(remaining), Some(reset)) = (
            response.rate_limit_remaining(),
            response.rate_limit_reset(),
        ) else {
            return;
        };
        if remaining <= 1 && reset > 0 {
            *self.pause_until.lock().await =
                Some(Instant::now() + Duration::from_secs(reset));
        }
    }

    /// Executes and parses the body as JSON.
    pub async fn get_json(&self, request: ApiRequest) -> Result<serde_json::Value, HarvestError> {
        let response = self.execute(request).await?;
        response.json()
    }

    /// Executes and returns the raw body text.
    pub async fn get_text(&self, request: ApiRequest) -> Result<String, HarvestError> {
        let response = self.execute(request).await?;
        Ok(response.body)
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats {
            total_requests: self.stats.total.load(Ordering::Relaxed),
            successful_requests: self.stats.successful.load(Ordering::Relaxed),
            rate_limited_requests: self.stats.rate_limited.load(Ordering::Relaxed),
            failed_requests: self.stats.failed.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            rate_limit_wait_ms: self.stats.rate_limit_wait_ms.load(Ordering::Relaxed),
        }
    }
}

/// Maps a 404 rejection to `Ok(None)`. Several secondary endpoints 404 when
/// the content simply does not exist (no spec file, no docs).
pub fn optional<T>(result: Result<T, HarvestError>) -> Result<Option<T>, HarvestError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
