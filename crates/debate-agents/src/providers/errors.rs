//! Provider failure taxonomy with retry classification.
//!
//! Callers query `is_retriable()` / `retry_category()` / `needs_escalation()`
//! without string matching.
//!
//! ## Retry categories
//!
//! | Variant          | Category      | Internal retry | Router fallback | Escalates |
//! |------------------|---------------|----------------|-----------------|-----------|
//! | RateLimited      | RateLimit     | yes            | yes             | no        |
//! | Timeout          | Transient     | yes            | yes             | no        |
//! | Provider         | Transient     | yes            | yes             | no        |
//! | Unavailable      | Fallback      | no             | yes             | no        |
//! | ModelNotFound    | Fallback      | no             | yes             | no        |
//! | QuotaExhausted   | Terminal      | no             | yes             | yes       |
//! | Auth             | Terminal      | no             | yes             | yes       |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Classification used to decide whether to retry in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network or backend hiccup; retried with backoff.
    Transient,
    /// Retried after the signalled delay, else backoff.
    RateLimit,
    /// Backend or model missing; the router moves on.
    Fallback,
    /// Needs external intervention (billing, credentials).
    Terminal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Fallback => write!(f, "fallback"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    // ── Retriable ─────────────────────────────────────────────────────────
    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider error: {0}")]
    Provider(String),

    // ── Fallback only ─────────────────────────────────────────────────────
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    // ── Terminal ──────────────────────────────────────────────────────────
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl ProviderError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::RateLimited { .. } => RetryCategory::RateLimit,
            Self::Timeout(_) | Self::Provider(_) => RetryCategory::Transient,
            Self::Unavailable(_) | Self::ModelNotFound(_) => RetryCategory::Fallback,
            Self::QuotaExhausted(_) | Self::Auth(_) => RetryCategory::Terminal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Whether exhausting the fallback chain on this error should alert someone.
    pub fn needs_escalation(&self) -> bool {
        self.retry_category() == RetryCategory::Terminal
    }

    /// Server-signalled delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map a non-success HTTP status and body onto the taxonomy.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let lower = body.to_lowercase();
        let mentions_quota = lower.contains("quota")
            || lower.contains("insufficient_quota")
            || lower.contains("billing")
            || lower.contains("credit balance");
        let message = format!("HTTP {}: {}", status, truncate(body, 300));
        match status {
            429 if mentions_quota => Self::QuotaExhausted(message),
            429 => Self::RateLimited {
                retry_after,
                message,
            },
            401 | 403 => Self::Auth(message),
            402 => Self::QuotaExhausted(message),
            404 => Self::ModelNotFound(message),
            400 if lower.contains("model") && lower.contains("not") => Self::ModelNotFound(message),
            408 => Self::Timeout(retry_after.unwrap_or_default()),
            503 => Self::Unavailable(message),
            _ => Self::Provider(message),
        }
    }

    /// Map a transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Provider(err.to_string())
        }
    }
}

/// Parse a `retry-after` header value given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max).collect();
        t.push('…');
        t
    }
}
