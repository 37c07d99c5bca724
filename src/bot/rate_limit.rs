use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

/// Limiter keyed by Telegram chat id.
pub type KeyedRateLimiter = RateLimiter<i64, DashMapStateStore<i64>, DefaultClock>;

const SUMMARY_PERIOD: Duration = Duration::from_secs(5 * 60);

pub struct RateLimiters {
    /// Any command, once per second.
    pub commands: KeyedRateLimiter,
    /// `/summary`, once per five minutes.
    pub summary: KeyedRateLimiter,
}

impl RateLimiters {
    pub fn new() -> Self {
        let summary_quota = Quota::with_period(SUMMARY_PERIOD)
            .unwrap_or_else(|| Quota::per_minute(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        Self {
            commands: RateLimiter::keyed(Quota::per_second(NonZeroU32::MIN)),
            summary: RateLimiter::keyed(summary_quota),
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_limited_per_chat() {
        let limiters = RateLimiters::new();
        assert!(limiters.summary.check_key(&1).is_ok());
        assert!(limiters.summary.check_key(&1).is_err());
        assert!(limiters.summary.check_key(&2).is_ok());
    }

    #[test]
    fn test_commands_burst_of_one() {
        let limiters = RateLimiters::new();
        assert!(limiters.commands.check_key(&7).is_ok());
        assert!(limiters.commands.check_key(&7).is_err());
    }
}
