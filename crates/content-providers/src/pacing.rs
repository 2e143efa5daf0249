use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

pub(crate) type RequestPacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Lets one request through per `period`, without bursts. Callers wait with
/// `until_ready().await` before each request.
pub(crate) fn request_pacer(period: Duration) -> RequestPacer {
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));

    RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn should_allow_one_request_per_period() {
        let pacer = request_pacer(Duration::from_secs(60));

        assert!(pacer.check().is_ok());
        assert!(pacer.check().is_err());
    }

    #[tokio::test]
    async fn should_delay_request_until_period_passed() {
        let pacer = request_pacer(Duration::from_millis(100));
        let started = Instant::now();

        pacer.until_ready().await;
        pacer.until_ready().await;

        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}
