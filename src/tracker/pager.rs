// ABOUTME: Scroll pagination over the tracker issue search endpoint
// ABOUTME: Drains every page until the accumulated count reaches X-Total-Count

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use super::client::{read_json, TrackerClient};
use crate::error::{Result, SyncError};

pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";
pub const SCROLL_ID_HEADER: &str = "X-Scroll-Id";
pub const SCROLL_TOKEN_HEADER: &str = "X-Scroll-Token";

const SCROLL_TYPE: &str = "unsorted";

/// Continuation cursor issued by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScrollCursor {
    id: String,
    token: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn total_count(headers: &HeaderMap) -> Result<Option<usize>> {
    match header_str(headers, TOTAL_COUNT_HEADER) {
        None => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            SyncError::Protocol(format!("{} is not a count: '{}'", TOTAL_COUNT_HEADER, raw))
        }),
    }
}

fn scroll_cursor(headers: &HeaderMap) -> Option<ScrollCursor> {
    Some(ScrollCursor {
        id: header_str(headers, SCROLL_ID_HEADER)?.to_string(),
        token: header_str(headers, SCROLL_TOKEN_HEADER)?.to_string(),
    })
}

impl TrackerClient {
    /// Fetch every issue matching `query`.
    ///
    /// The first request opens a scroll; each later request resumes it with
    /// the id and token of the previous response. Stops once the number of
    /// records reaches the reported total, so a total of zero issues a single
    /// request. A page budget guards against a total that never converges.
    pub async fn fetch_all(&self, query: &str) -> Result<Vec<JsonValue>> {
        let config = self.config();
        let url = self.url("_search");
        let body = json!({ "query": query });

        let mut request = self
            .request(Method::POST, &url)
            .query(&[
                ("scrollType", SCROLL_TYPE.to_string()),
                ("perScroll", config.per_scroll.to_string()),
                ("scrollTTLMillis", config.scroll_ttl_ms.to_string()),
            ])
            .json(&body);

        let mut records: Vec<JsonValue> = Vec::new();
        let mut total: Option<usize> = None;
        let mut pages = 0usize;

        loop {
            if pages >= config.max_pages {
                return Err(SyncError::Protocol(format!(
                    "scroll did not finish within {} pages ({} of {} records received)",
                    config.max_pages,
                    records.len(),
                    total.unwrap_or_default()
                )));
            }

            let response = self.send(request).await?;
            pages += 1;
            let headers = response.headers().clone();
            let page: Vec<JsonValue> = read_json(response).await?;
            let page_len = page.len();

            total = match total_count(&headers)? {
                Some(reported) => Some(reported),
                None if total.is_none() && page_len > 0 => {
                    return Err(SyncError::Protocol(format!(
                        "search response without {} header",
                        TOTAL_COUNT_HEADER
                    )));
                }
                None => total,
            };
            let expected = total.unwrap_or_default();
            records.extend(page);

            tracing::debug!(
                page = pages,
                page_len,
                received = records.len(),
                total = expected,
                "fetched search page"
            );

            if records.len() >= expected {
                break;
            }
            if page_len == 0 {
                return Err(SyncError::Protocol(format!(
                    "empty search page with {} of {} records received",
                    records.len(),
                    expected
                )));
            }

            let cursor = scroll_cursor(&headers).ok_or_else(|| {
                SyncError::Protocol(format!(
                    "{} or {} missing with {} of {} records received",
                    SCROLL_ID_HEADER,
                    SCROLL_TOKEN_HEADER,
                    records.len(),
                    expected
                ))
            })?;

            request = self
                .request(Method::POST, &url)
                .query(&[("scrollId", cursor.id), ("scrollToken", cursor.token)])
                .json(&body);
        }

        tracing::info!(records = records.len(), pages, "tracker search complete");
        Ok(records)
    }
}
