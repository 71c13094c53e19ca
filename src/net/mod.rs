//! Resilient HTTP fetch layer.
//!
//! Single entry point for all upstream REST calls: [`fetch_json`] issues an
//! uncached GET asking for JSON and disambiguates the three ways an API can
//! disappoint: an error status (with either a structured JSON error body or
//! an HTML error/login page), a success status carrying a non-JSON payload,
//! and a body that simply fails to parse. [`with_retry`] wraps a fallible
//! async operation in the bounded fixed-backoff policy used for the flakier
//! provider endpoints.

use std::future::Future;
use std::time::Duration;

use log::debug;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::errors::MarketDataError;

/// Total attempts made by [`with_retry`].
pub const RETRY_TRIES: usize = 3;

/// Fixed backoff schedule between attempts, in milliseconds.
const RETRY_DELAYS_MS: [u64; 3] = [250, 600, 1200];

/// Structured error body some upstreams return alongside an error status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// GET `url` and decode the response as JSON into `T`.
///
/// Caching is disabled and a JSON representation requested. HTTP 429 maps to
/// [`MarketDataError::RateLimited`]; other error statuses become
/// [`MarketDataError::Transport`] carrying the upstream's own
/// `error`/`message` field when one is present, with an HTML marker when the
/// body turns out to be a login or gateway page instead of API output.
/// Cancelling `cancel` aborts at any await point with
/// [`MarketDataError::Cancelled`].
pub async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    cancel: &CancellationToken,
) -> Result<T, MarketDataError> {
    if cancel.is_cancelled() {
        return Err(MarketDataError::Cancelled);
    }

    let request = client
        .get(url)
        .header(ACCEPT, "application/json")
        .header(CACHE_CONTROL, "no-store");

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(MarketDataError::Cancelled),
        result = request.send() => result?,
    };

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MarketDataError::RateLimited {
            host: host_of(url),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = tokio::select! {
        _ = cancel.cancelled() => return Err(MarketDataError::Cancelled),
        result = response.text() => result.unwrap_or_default(),
    };

    decode_body(status.as_u16(), &content_type, &body)
}

/// Interpret a response body according to status and content type.
///
/// Kept separate from the transport so the disambiguation rules are testable
/// against literal payloads.
fn decode_body<T: DeserializeOwned>(
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<T, MarketDataError> {
    let looks_html = content_type.contains("text/html") || body.trim_start().starts_with('<');

    if !(200..300).contains(&status) {
        if looks_html {
            return Err(MarketDataError::html_response(status));
        }
        if let Ok(err_body) = serde_json::from_str::<ErrorBody>(body) {
            if let Some(message) = err_body.error.or(err_body.message) {
                return Err(MarketDataError::Transport {
                    status,
                    message,
                    html: false,
                });
            }
        }
        return Err(MarketDataError::http_status(status));
    }

    if !content_type.contains("application/json") && looks_html {
        return Err(MarketDataError::Transport {
            status,
            message: "HTML response".to_string(),
            html: true,
        });
    }

    serde_json::from_str(body).map_err(|e| MarketDataError::Payload {
        message: e.to_string(),
    })
}

/// Re-invoke `op` up to [`RETRY_TRIES`] times with fixed backoff delays
/// between attempts. The final attempt's error is the one surfaced.
/// Cancellation aborts immediately, consuming no attempt and skipping any
/// remaining delay.
pub async fn with_retry<T, F, Fut>(cancel: &CancellationToken, mut op: F) -> Result<T, MarketDataError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    for attempt in 1..RETRY_TRIES {
        if cancel.is_cancelled() {
            return Err(MarketDataError::Cancelled);
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(MarketDataError::Cancelled) => return Err(MarketDataError::Cancelled),
            Err(err) => {
                let delay = RETRY_DELAYS_MS.get(attempt - 1).copied().unwrap_or(800);
                debug!(
                    "attempt {}/{} failed ({}), retrying in {} ms",
                    attempt, RETRY_TRIES, err, delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(MarketDataError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(MarketDataError::Cancelled);
    }
    op().await
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
