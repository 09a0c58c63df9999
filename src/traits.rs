//! Transport seam and error taxonomy.
//!
//! The [`HttpTransport`] trait is the single boundary between the harvesting
//! engine and the network. Production code uses the `reqwest`-backed
//! implementation in [`crate::transport`]; tests substitute in-memory
//! transports that script status codes and bodies.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// HTTP method subset used by the platform APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Request descriptor handed to the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Form-encoded body (token endpoint only).
    pub form: Option<Vec<(String, String)>>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            form: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            form: Some(form),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Response as seen by the executor.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn header_u64(&self, name: &str) -> Option<u64> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.parse().ok())
    }

    /// `Retry-After` header in seconds, when the provider sent one.
    pub fn retry_after(&self) -> Option<u64> {
        self.header_u64("retry-after")
    }

    /// Requests left in the provider's current rate-limit window.
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.header_u64("x-ratelimit-remaining")
    }

    /// Seconds until the provider's rate-limit window resets.
    pub fn rate_limit_reset(&self) -> Option<u64> {
        self.header_u64("x-ratelimit-reset")
    }

    pub fn json(&self) -> Result<serde_json::Value, HarvestError> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&self.body)
            .map_err(|e| HarvestError::InvalidResponse(format!("JSON parse failed: {e}")))
    }
}

/// Network-level failure below the HTTP status layer.
#[derive(Error, Debug, Clone)]
pub enum TransportFailure {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// The sole gateway to the network. One call, one response; retry and rate
/// pacing live above this seam.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportFailure>;
}

/// Failure taxonomy for the harvesting engine.
#[derive(Error, Debug, Clone)]
pub enum HarvestError {
    /// Retries exhausted against sustained 429s. Recoverable by lowering rps.
    #[error("rate limit exceeded after {attempts} attempts (last status {status})")]
    RateLimitExceeded { status: u16, attempts: u32 },

    /// Retries exhausted against 5xx or network failures. Likely transient.
    #[error("upstream unavailable after {attempts} attempts (last status {last_status:?})")]
    UpstreamUnavailable {
        last_status: Option<u16>,
        attempts: u32,
    },

    /// Non-retryable 4xx; signals a configuration or permission problem.
    #[error("request rejected with status {status}: {url}")]
    RequestRejected { status: u16, url: String },

    /// Token acquisition failed. Fatal to the whole run.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl HarvestError {
    /// True for the 404 case harvesters treat as "content absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarvestError::RequestRejected { status: 404, .. })
    }
}

/// A paginated collection that stopped early. Carries everything gathered
/// before the failing page so the aggregator can decide whether a partial
/// source is acceptable.
#[derive(Error, Debug)]
#[error("collection stopped after {} records: {source}", collected.len())]
pub struct PartialCollectionFailure<T> {
    pub collected: Vec<T>,
    #[source]
    pub source: HarvestError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_header_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "17".to_string());
        let response = ApiResponse {
            status: 429,
            headers,
            body: String::new(),
        };
        assert_eq!(response.retry_after(), Some(17));
    }

    #[test]
    fn rate_limit_headers_parse_case_insensitively() {
        let mut headers = HashMap::new();
        headers.insert("X-RateLimit-Remaining".to_string(), "3".to_string());
        headers.insert("x-ratelimit-reset".to_string(), "42".to_string());
        let response = ApiResponse {
            status: 200,
            headers,
            body: String::new(),
        };
        assert_eq!(response.rate_limit_remaining(), Some(3));
        assert_eq!(response.rate_limit_reset(), Some(42));
    }

    #[test]
    fn not_found_detection() {
        let err = HarvestError::RequestRejected {
            status: 404,
            url: "u".into(),
        };
        assert!(err.is_not_found());
        let err = HarvestError::RequestRejected {
            status: 403,
            url: "u".into(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn empty_body_parses_as_null() {
        let response = ApiResponse {
            status: 200,
            headers: HashMap::new(),
            body: String::new(),
        };
        assert_eq!(response.json().unwrap(), serde_json::Value::Null);
    }
}
