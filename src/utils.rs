use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// `base * 2^(attempt - 1)`, capped at `max`.
pub(crate) fn exponential_backoff(base: Duration, attempt: u32, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);

    base.saturating_mul(1u32 << exponent).min(max)
}
