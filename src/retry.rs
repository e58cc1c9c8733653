//! Retry policy for the external-service clients.
//!
//! Transient failures (429, 5xx, connect/timeout) back off exponentially
//! with full jitter: base 500 ms, cap 15 s, at most 5 attempts. Permanent
//! failures surface immediately.

use std::time::Duration;

use rand::Rng;

pub const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 15_000;

/// Full-jitter delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(10));
    let ceiling = exp.min(MAX_DELAY_MS);
    let jittered = rand::thread_rng().gen_range(0..=ceiling);
    Duration::from_millis(jittered)
}

/// Whether an HTTP status is worth retrying.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Whether a transport-level error is worth retrying.
pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_respects_cap() {
        for attempt in 1..=MAX_ATTEMPTS {
            let d = backoff_delay(attempt);
            assert!(d <= Duration::from_millis(MAX_DELAY_MS));
        }
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(reqwest::StatusCode::UNAUTHORIZED));
    }
}
