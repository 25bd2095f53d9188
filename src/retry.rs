//! Error classification and exponential-backoff retry (component G).

use std::time::Duration;

use crate::error::CrawlErrorKind;

/// Substrings folded in from the Go `errors.go`'s `isNetworkError`, which lists
/// "broken pipe" and "no route" in addition to spec.md's enumerated set.
const NETWORK_KEYWORDS: &[&str] = &[
    "connection",
    "network",
    "dns",
    "host",
    "unreachable",
    "reset",
    "broken pipe",
    "no route",
];

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "deadline exceeded"];

/// Classifies a raw error message into the taxonomy retry/backoff decisions key off.
///
/// Navigation errors containing `net::ERR_ABORTED` are the expected shape of a
/// deliberate interception-state-machine abort and are classified as
/// [`CrawlErrorKind::NavigationAborted`] so callers can silently ignore them.
#[must_use]
pub fn classify_error(message: &str) -> CrawlErrorKind {
    if message.contains("net::ERR_ABORTED") {
        return CrawlErrorKind::NavigationAborted;
    }

    let lower = message.to_lowercase();

    if TIMEOUT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return CrawlErrorKind::Timeout;
    }

    if lower.contains("canceled") || lower.contains("cancelled") {
        return CrawlErrorKind::Canceled;
    }

    if lower.contains("connection refused") || NETWORK_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return CrawlErrorKind::Network;
    }

    CrawlErrorKind::Other
}

/// Exponential backoff: `base * 2^attempt`, capped at 10s, matching the Go
/// `retryWithBackoff`'s `math.Pow(2, i) * baseDelay` computation.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    let delay = base.saturating_mul(factor);
    delay.min(Duration::from_secs(10))
}

/// Retries `f` up to `max_attempts` times with exponential backoff between attempts.
/// Non-retryable errors (per [`classify_error`]) return immediately without retrying.
///
/// # Errors
///
/// Returns the last error produced by `f` if every attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut f: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err = None;

    for attempt in 0..max_attempts {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify_error(&e.to_string());
                if !kind.is_retryable() {
                    return Err(e);
                }
                if attempt + 1 < max_attempts {
                    tokio::time::sleep(backoff_delay(attempt, base_delay)).await;
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("max_attempts > 0 guarantees at least one error was recorded"))
}
