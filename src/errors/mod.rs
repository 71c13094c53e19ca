//! Error types and failure classification for the market data engine.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`FailureAction`]: Classification for determining orchestrator behavior

mod action;

pub use action::FailureAction;

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`FailureAction`] via the
/// [`failure_action`](Self::failure_action) method, which determines how the
/// aggregation orchestrator reacts: drop, cool down, fail over, or report.
///
/// The discriminant is fixed at the point the upstream response is parsed.
/// In particular, an entitlement denial becomes [`Entitlement`](Self::Entitlement)
/// when the adapter sees the provider's HTTP 403, never by matching substrings
/// of an error message later.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// Non-2xx HTTP response, or a payload that turned out to be an HTML
    /// page where JSON was expected (login walls, gateway error pages).
    #[error("{message}")]
    Transport {
        /// HTTP status code of the response
        status: u16,
        /// Human-readable message, either the upstream's own `error`/`message`
        /// field or a generic `HTTP <status>`
        message: String,
        /// True when the body sniffed as HTML rather than structured JSON
        html: bool,
    },

    /// The body could not be interpreted as JSON at all.
    #[error("Bad payload: {message}")]
    Payload {
        /// Description of what failed to parse
        message: String,
    },

    /// The provider returned 2xx but reported its own logical error
    /// (e.g. a `status: "error"` field with a message).
    #[error("{provider}: {message}")]
    Upstream {
        /// The provider that reported the error
        provider: String,
        /// The provider's error message
        message: String,
    },

    /// The credential's subscription tier lacks access to this endpoint or
    /// symbol. Signaled by the restricted provider with HTTP 403.
    #[error("{provider}: no access with current plan")]
    Entitlement {
        /// The provider that denied access
        provider: String,
    },

    /// The request was valid but there is no data for the symbol, even after
    /// any venue fallback the adapter performs internally.
    #[error("No data for {symbol}")]
    NoData {
        /// The symbol that came back empty
        symbol: String,
    },

    /// The provider rate limited the request (HTTP 429).
    /// Triggers the global refresh cooldown.
    #[error("Rate limited by {host}")]
    RateLimited {
        /// Host that returned 429
        host: String,
    },

    /// Caller-initiated cancellation (superseded search keystroke, engine
    /// shutdown). Bypasses retry and is never user-visible.
    #[error("Cancelled")]
    Cancelled,

    /// An operation that requires the active provider's credential was
    /// invoked without one configured.
    #[error("No API key configured for {provider}")]
    MissingCredential {
        /// The provider the credential was missing for
        provider: String,
    },

    /// A network error occurred while communicating with an upstream host.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the failure classification for this error.
    ///
    /// This classification determines how the orchestrator handles the error:
    ///
    /// - [`FailureAction::Ignore`]: Drop it, the caller gave up on purpose
    /// - [`FailureAction::Cooldown`]: Pause automatic refreshes for a window
    /// - [`FailureAction::Failover`]: Retry against the alternate provider
    /// - [`FailureAction::Report`]: Per-symbol user notice
    ///
    /// # Examples
    ///
    /// ```
    /// use marketlens::errors::{FailureAction, MarketDataError};
    ///
    /// let error = MarketDataError::RateLimited { host: "finnhub.io".to_string() };
    /// assert_eq!(error.failure_action(), FailureAction::Cooldown);
    ///
    /// let error = MarketDataError::Cancelled;
    /// assert_eq!(error.failure_action(), FailureAction::Ignore);
    /// ```
    pub fn failure_action(&self) -> FailureAction {
        match self {
            Self::Cancelled => FailureAction::Ignore,

            Self::RateLimited { .. } => FailureAction::Cooldown,

            Self::Entitlement { .. } => FailureAction::Failover,

            // Everything else is reported per symbol and the cached record
            // is left in place.
            Self::Transport { .. }
            | Self::Payload { .. }
            | Self::Upstream { .. }
            | Self::NoData { .. }
            | Self::MissingCredential { .. }
            | Self::Network(_) => FailureAction::Report,
        }
    }

    /// Build a transport error with the generic status-coded message.
    pub fn http_status(status: u16) -> Self {
        Self::Transport {
            status,
            message: format!("HTTP {}", status),
            html: false,
        }
    }

    /// Build a transport error for a response that sniffed as HTML.
    pub fn html_response(status: u16) -> Self {
        Self::Transport {
            status,
            message: format!("HTTP {} (HTML)", status),
            html: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_ignored() {
        let error = MarketDataError::Cancelled;
        assert_eq!(error.failure_action(), FailureAction::Ignore);
    }

    #[test]
    fn test_rate_limited_triggers_cooldown() {
        let error = MarketDataError::RateLimited {
            host: "finnhub.io".to_string(),
        };
        assert_eq!(error.failure_action(), FailureAction::Cooldown);
    }

    #[test]
    fn test_entitlement_triggers_failover() {
        let error = MarketDataError::Entitlement {
            provider: "FINNHUB".to_string(),
        };
        assert_eq!(error.failure_action(), FailureAction::Failover);
    }

    #[test]
    fn test_transport_is_reported() {
        let error = MarketDataError::http_status(500);
        assert_eq!(error.failure_action(), FailureAction::Report);
    }

    #[test]
    fn test_payload_is_reported() {
        let error = MarketDataError::Payload {
            message: "expected value at line 1".to_string(),
        };
        assert_eq!(error.failure_action(), FailureAction::Report);
    }

    #[test]
    fn test_upstream_is_reported() {
        let error = MarketDataError::Upstream {
            provider: "TWELVE_DATA".to_string(),
            message: "symbol not supported".to_string(),
        };
        assert_eq!(error.failure_action(), FailureAction::Report);
    }

    #[test]
    fn test_no_data_is_reported() {
        let error = MarketDataError::NoData {
            symbol: "COINBASE:BTC-USD".to_string(),
        };
        assert_eq!(error.failure_action(), FailureAction::Report);
    }

    #[test]
    fn test_missing_credential_is_reported() {
        let error = MarketDataError::MissingCredential {
            provider: "FINNHUB".to_string(),
        };
        assert_eq!(error.failure_action(), FailureAction::Report);
    }

    #[test]
    fn test_html_marker() {
        let error = MarketDataError::html_response(502);
        match error {
            MarketDataError::Transport { status, html, .. } => {
                assert_eq!(status, 502);
                assert!(html);
            }
            _ => panic!("expected transport error"),
        }
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::http_status(500);
        assert_eq!(format!("{}", error), "HTTP 500");

        let error = MarketDataError::html_response(502);
        assert_eq!(format!("{}", error), "HTTP 502 (HTML)");

        let error = MarketDataError::Upstream {
            provider: "TWELVE_DATA".to_string(),
            message: "symbol not supported".to_string(),
        };
        assert_eq!(format!("{}", error), "TWELVE_DATA: symbol not supported");

        let error = MarketDataError::NoData {
            symbol: "COINBASE:BTC-USD".to_string(),
        };
        assert_eq!(format!("{}", error), "No data for COINBASE:BTC-USD");
    }
}
