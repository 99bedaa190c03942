//! Heartbeat monitor and reconnect backoff

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::SessionStatus;

/// Capped exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay before the `failures`-th consecutive reconnect: `base * 2^(failures - 1)`, capped
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (failures - 1).min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Ticks on a fixed period and reports when the feed has gone quiet
#[derive(Debug)]
pub struct HeartbeatMonitor {
    ticker: Interval,
    stale_after: Duration,
}

impl HeartbeatMonitor {
    /// First check fires one period from now
    pub fn new(period: Duration, stale_after: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            stale_after,
        }
    }

    /// Wait for the next tick; `Some(silence)` when the feed is stale
    pub async fn tick(&mut self, status: &SessionStatus) -> Option<Duration> {
        self.ticker.tick().await;
        let silence = status.silence();
        (silence > self.stale_after).then_some(silence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::new(Duration::from_millis(1000), Duration::from_secs(60));
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(7), Duration::from_secs(60));
        assert_eq!(policy.delay(100), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reported_on_first_tick_past_threshold() {
        let status = SessionStatus::new();
        status.touch();
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(5), Duration::from_secs(30));

        let start = Instant::now();
        let mut checks = 0;
        let silence = loop {
            checks += 1;
            if let Some(silence) = monitor.tick(&status).await {
                break silence;
            }
        };

        // Ticks at 5, 10, ..., 30 see at most 30s of silence; 35 is the first over
        assert_eq!(checks, 7);
        assert_eq!(start.elapsed(), Duration::from_secs(35));
        assert_eq!(silence, Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_monitor_quiet() {
        let status = SessionStatus::new();
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(5), Duration::from_secs(30));
        for _ in 0..20 {
            status.touch();
            assert_eq!(monitor.tick(&status).await, None);
        }
    }
}
