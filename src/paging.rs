//! Paginated collector: walks a paged listing endpoint to completion.
//!
//! Cursor shapes vary across platform subsystems (offset-based vs
//! token-based); [`CursorStyle`] abstracts the difference so the collector
//! stays source-agnostic. Termination is driven solely by page fullness —
//! the platform does not return a total count up front.

use crate::executor::RequestExecutor;
use crate::traits::{ApiRequest, PartialCollectionFailure};
use serde_json::Value;
use tracing::debug;

/// Pagination variant for one endpoint.
#[derive(Debug, Clone)]
pub enum CursorStyle {
    /// `?offset=N&limit=page_size`, offset advances by page size.
    Offset {
        offset_param: &'static str,
        limit_param: &'static str,
    },
    /// `?cursor=T&limit=page_size`, next token read from the response.
    Token {
        token_param: &'static str,
        limit_param: &'static str,
        next_field: &'static str,
    },
}

impl CursorStyle {
    pub fn offset() -> Self {
        CursorStyle::Offset {
            offset_param: "offset",
            limit_param: "limit",
        }
    }

    pub fn token(next_field: &'static str) -> Self {
        CursorStyle::Token {
            token_param: "cursor",
            limit_param: "limit",
            next_field,
        }
    }
}

/// One paged listing endpoint.
#[derive(Debug, Clone)]
pub struct PagedEndpoint {
    pub request: ApiRequest,
    pub style: CursorStyle,
    pub page_size: u64,
    /// Field holding the record array when the body is an object; a bare
    /// array body is used as-is.
    pub records_field: Option<&'static str>,
    /// Optional safety cap on total records collected.
    pub max_records: Option<usize>,
}

impl PagedEndpoint {
    pub fn new(request: ApiRequest, style: CursorStyle, page_size: u64) -> Self {
        Self {
            request,
            style,
            page_size,
            records_field: None,
            max_records: None,
        }
    }

    pub fn records_field(mut self, field: &'static str) -> Self {
        self.records_field = Some(field);
        self
    }

    pub fn max_records(mut self, cap: usize) -> Self {
        self.max_records = Some(cap);
        self
    }
}

enum Cursor {
    Offset(u64),
    Token(Option<String>),
}

fn extract_records(body: &Value, records_field: Option<&'static str>) -> Vec<Value> {
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) => records_field
            .and_then(|f| map.get(f))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Walks the endpoint page by page and returns the concatenation in server
/// order. A failing page K after successful pages 1..K-1 yields
/// [`PartialCollectionFailure`] carrying everything collected so far.
pub async fn collect_all(
    executor: &RequestExecutor,
    endpoint: &PagedEndpoint,
) -> Result<Vec<Value>, PartialCollectionFailure<Value>> {
    let mut collected: Vec<Value> = Vec::new();
    let mut cursor = match endpoint.style {
        CursorStyle::Offset { .. } => Cursor::Offset(0),
        CursorStyle::Token { .. } => Cursor::Token(None),
    };

    loop {
        let mut request = endpoint.request.clone();
        match (&endpoint.style, &cursor) {
            (
                CursorStyle::Offset {
                    offset_param,
                    limit_param,
                },
                Cursor::Offset(offset),
            ) => {
                request = request
                    .with_query(*offset_param, offset.to_string())
                    .with_query(*limit_param, endpoint.page_size.to_string());
            }
            (
                CursorStyle::Token {
                    token_param,
                    limit_param,
                    ..
                },
                Cursor::Token(token),
            ) => {
                request = request.with_query(*limit_param, endpoint.page_size.to_string());
                if let Some(token) = token {
                    request = request.with_query(*token_param, token.clone());
                }
            }
            _ => unreachable!("cursor matches style by construction"),
        }

        let body = match executor.get_json(request).await {
            Ok(body) => body,
            Err(source) => {
                return Err(PartialCollectionFailure { collected, source });
            }
        };

        let records = extract_records(&body, endpoint.records_field);
        let page_len = records.len();
        debug!(url = %endpoint.request.url, page_len, "collected page");
        collected.extend(records);

        if page_len < endpoint.page_size as usize {
            break;
        }
        if let Some(cap) = endpoint.max_records {
            if collected.len() >= cap {
                collected.truncate(cap);
                break;
            }
        }

        match (&endpoint.style, &mut cursor) {
            (CursorStyle::Offset { .. }, Cursor::Offset(offset)) => {
                *offset += endpoint.page_size;
            }
            (CursorStyle::Token { next_field, .. }, Cursor::Token(token)) => {
                let next = body.get(*next_field).and_then(|t| t.as_str());
                match next {
                    Some(next) => *token = Some(next.to_string()),
                    None => break,
                }
            }
            _ => unreachable!("cursor matches style by construction"),
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use crate::config::{PlatformConfig, RateConfig, Region};
    use crate::executor::test_support::{Scripted, ScriptedTransport};
    use crate::traits::{ApiRequest, ApiResponse, HarvestError, HttpTransport, TransportFailure};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn executor_with(transport: Arc<dyn HttpTransport>) -> RequestExecutor {
        let platform = PlatformConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            org_id: "org".into(),
            region: Region::Us,
        };
        let auth = Authenticator::new(transport.clone(), &platform);
        let rate = RateConfig {
            requests_per_second: 1000.0,
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            batch_size: 0,
            batch_pause: Duration::ZERO,
        };
        RequestExecutor::new(transport, auth, rate)
    }

    /// Serves offset-paged records out of a fixed pool.
    struct OffsetPagedTransport {
        pool: usize,
        pub calls: AtomicUsize,
        fail_from_offset: Option<usize>,
    }

    #[async_trait]
    impl HttpTransport for OffsetPagedTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let get = |name: &str| {
                request
                    .query
                    .iter()
                    .find(|(k, _)| k == name)
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0)
            };
            let offset = get("offset");
            let limit = get("limit");
            if let Some(fail_at) = self.fail_from_offset {
                if offset >= fail_at {
                    return Ok(ApiResponse {
                        status: 500,
                        headers: HashMap::new(),
                        body: String::new(),
                    });
                }
            }
            let end = (offset + limit).min(self.pool);
            let records: Vec<serde_json::Value> =
                (offset..end).map(|i| serde_json::json!({ "n": i })).collect();
            Ok(ApiResponse {
                status: 200,
                headers: HashMap::new(),
                body: serde_json::json!({ "assets": records }).to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn offset_paging_stops_on_short_page() {
        // Pages of 50,50,50,30 with page_size 50 → 180 records, 4 requests.
        let transport = Arc::new(OffsetPagedTransport {
            pool: 180,
            calls: AtomicUsize::new(0),
            fail_from_offset: None,
        });
        let exec = executor_with(transport.clone());
        let endpoint = PagedEndpoint::new(
            ApiRequest::get("https://x/assets"),
            CursorStyle::offset(),
            50,
        )
        .records_field("assets");

        let records = collect_all(&exec, &endpoint).await.unwrap();
        assert_eq!(records.len(), 180);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        // Server order preserved.
        assert_eq!(records[0]["n"], 0);
        assert_eq!(records[179]["n"], 179);
    }

    #[tokio::test(start_paused = true)]
    async fn exact_multiple_needs_one_extra_empty_page() {
        let transport = Arc::new(OffsetPagedTransport {
            pool: 100,
            calls: AtomicUsize::new(0),
            fail_from_offset: None,
        });
        let exec = executor_with(transport.clone());
        let endpoint = PagedEndpoint::new(
            ApiRequest::get("https://x/assets"),
            CursorStyle::offset(),
            50,
        )
        .records_field("assets");

        let records = collect_all(&exec, &endpoint).await.unwrap();
        assert_eq!(records.len(), 100);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_page_yields_partial_collection() {
        let transport = Arc::new(OffsetPagedTransport {
            pool: 500,
            calls: AtomicUsize::new(0),
            fail_from_offset: Some(100),
        });
        let exec = executor_with(transport);
        let endpoint = PagedEndpoint::new(
            ApiRequest::get("https://x/assets"),
            CursorStyle::offset(),
            50,
        )
        .records_field("assets");

        let failure = collect_all(&exec, &endpoint).await.unwrap_err();
        assert_eq!(failure.collected.len(), 100);
        assert!(matches!(
            failure.source,
            HarvestError::UpstreamUnavailable { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn max_records_caps_collection() {
        let transport = Arc::new(OffsetPagedTransport {
            pool: 10_000,
            calls: AtomicUsize::new(0),
            fail_from_offset: None,
        });
        let exec = executor_with(transport);
        let endpoint = PagedEndpoint::new(
            ApiRequest::get("https://x/assets"),
            CursorStyle::offset(),
            100,
        )
        .records_field("assets")
        .max_records(500);

        let records = collect_all(&exec, &endpoint).await.unwrap();
        assert_eq!(records.len(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn token_paging_follows_next_token() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Scripted::Status(200, r#"{"items":[1,2],"next":"t1"}"#),
            Scripted::Status(200, r#"{"items":[3,4],"next":"t2"}"#),
            Scripted::Status(200, r#"{"items":[5]}"#),
        ]));
        let exec = executor_with(transport.clone());
        let endpoint = PagedEndpoint::new(
            ApiRequest::get("https://x/tokens"),
            CursorStyle::token("next"),
            2,
        )
        .records_field("items");

        let records = collect_all(&exec, &endpoint).await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn bare_array_body_is_collected() {
        let transport = Arc::new(ScriptedTransport::new(vec![Scripted::Status(
            200,
            r#"[{"a":1},{"a":2}]"#,
        )]));
        let exec = executor_with(transport);
        let endpoint = PagedEndpoint::new(
            ApiRequest::get("https://x/list"),
            CursorStyle::offset(),
            50,
        );
        let records = collect_all(&exec, &endpoint).await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
