//! Process-wide request and token quota against the external provider.
//!
//! Every orchestration loop shares one `Arc<RateLimiter>`. The window is held
//! behind a single async mutex for the whole of `acquire`, including any
//! suspension, so concurrent callers queue behind whichever one performs the
//! reset instead of racing past the same window boundary.
//!
//! Counters are only written after the last suspension point, so dropping an
//! in-flight `acquire` leaves them untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use siloed_config::RateLimitConfig;
use siloed_core::event::{DomainEvent, EventBus, QuotaKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Shared quota counters.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    pub request_count: u64,
    pub token_count: u64,
    pub total_calls: u64,
    pub window_start_request: Instant,
    pub window_start_token: Instant,
    /// Bumped on every token window reset.
    pub token_generation: u64,
}

impl RateLimitWindow {
    fn new(now: Instant) -> Self {
        Self {
            request_count: 0,
            token_count: 0,
            total_calls: 0,
            window_start_request: now,
            window_start_token: now,
            token_generation: 0,
        }
    }

    fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            request_count: self.request_count,
            token_count: self.token_count,
            total_calls: self.total_calls,
        }
    }
}

/// Point-in-time copy of the counters, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub request_count: u64,
    pub token_count: u64,
    pub total_calls: u64,
}

/// Proof of one counted call, carrying the estimate it was charged.
///
/// Settled with [`RateLimiter::record_usage`] once the provider reports usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageGrant {
    generation: u64,
    estimated: u64,
}

pub struct RateLimiter {
    max_requests: u64,
    max_tokens: u64,
    window: Duration,
    cooldown_interval: u64,
    cooldown: Duration,
    state: Mutex<RateLimitWindow>,
    /// Last published counters; readable without waiting on `state`.
    published: watch::Sender<RateLimitSnapshot>,
    event_bus: Option<Arc<EventBus>>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, max_tokens: u64, window: Duration) -> Self {
        let (published, _) = watch::channel(RateLimitSnapshot::default());
        Self {
            max_requests,
            max_tokens,
            window,
            cooldown_interval: 0,
            cooldown: Duration::ZERO,
            state: Mutex::new(RateLimitWindow::new(Instant::now())),
            published,
            event_bus: None,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests_per_window,
            config.max_tokens_per_window,
            Duration::from_secs(config.window_secs),
        )
        .with_cooldown(
            config.cooldown_interval,
            Duration::from_secs(config.cooldown_secs),
        )
    }

    /// Suspend for `duration` before every `every`-th call past the first (0 disables).
    pub fn with_cooldown(mut self, every: u64, duration: Duration) -> Self {
        self.cooldown_interval = every;
        self.cooldown = duration;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Wait until one provider call may be issued, then count it.
    pub async fn acquire(&self, estimated_tokens: u64) -> UsageGrant {
        let mut window = self.state.lock().await;

        if self.cooldown_interval > 0
            && !self.cooldown.is_zero()
            && window.total_calls > 0
            && window.total_calls % self.cooldown_interval == 0
        {
            self.suspend(QuotaKind::Cooldown, self.cooldown).await;
        }

        if window.request_count >= self.max_requests {
            let elapsed = window.window_start_request.elapsed();
            if elapsed < self.window {
                self.suspend(QuotaKind::Requests, self.window - elapsed).await;
            }
        }

        if window.token_count >= self.max_tokens {
            let elapsed = window.window_start_token.elapsed();
            if elapsed < self.window {
                self.suspend(QuotaKind::Tokens, self.window - elapsed).await;
            }
        }

        // No suspension past this point
        let now = Instant::now();
        if window.request_count >= self.max_requests {
            window.request_count = 0;
            window.window_start_request = now;
        }
        if window.token_count >= self.max_tokens {
            window.token_count = 0;
            window.window_start_token = now;
            window.token_generation += 1;
        }

        window.request_count += 1;
        window.token_count = window.token_count.saturating_add(estimated_tokens);
        window.total_calls += 1;

        debug!(
            request_count = window.request_count,
            token_count = window.token_count,
            total_calls = window.total_calls,
            "Rate limit slot acquired"
        );
        self.published.send_replace(window.snapshot());
        UsageGrant {
            generation: window.token_generation,
            estimated: estimated_tokens,
        }
    }

    /// Replace a grant's estimate with the usage the provider actually reported.
    ///
    /// When the token window has reset since the grant, the estimate is no
    /// longer in the counter and only `actual` is charged.
    pub async fn record_usage(&self, grant: UsageGrant, actual: u64) {
        let mut window = self.state.lock().await;
        let base = if window.token_generation == grant.generation {
            window.token_count.saturating_sub(grant.estimated)
        } else {
            window.token_count
        };
        window.token_count = base.saturating_add(actual);
        self.published.send_replace(window.snapshot());
    }

    /// Charge tokens spent outside an `acquire`d call.
    pub async fn record_tokens(&self, actual: u64) {
        let mut window = self.state.lock().await;
        window.token_count = window.token_count.saturating_add(actual);
        self.published.send_replace(window.snapshot());
    }

    /// Counters as of the last completed update.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        *self.published.borrow()
    }

    async fn suspend(&self, kind: QuotaKind, wait: Duration) {
        let wait_ms = wait.as_millis() as u64;
        info!(kind = ?kind, wait_ms, "Rate limit reached, waiting");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::QuotaWait {
                kind,
                wait_ms,
                timestamp: Utc::now(),
            });
        }
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn third_request_waits_for_window_boundary() {
        let limiter = RateLimiter::new(2, 1_000_000, MINUTE);
        let start = Instant::now();

        limiter.acquire(1).await;
        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), MINUTE);
        assert_eq!(limiter.snapshot().request_count, 1);
        assert_eq!(limiter.snapshot().total_calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_window_resets_without_waiting() {
        let limiter = RateLimiter::new(2, 1_000_000, MINUTE);
        limiter.acquire(1).await;
        limiter.acquire(1).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        let start = Instant::now();
        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.snapshot().request_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn under_quota_counters_do_not_reset() {
        let limiter = RateLimiter::new(10, 1_000_000, MINUTE);
        limiter.acquire(5).await;
        tokio::time::advance(Duration::from_secs(120)).await;
        limiter.acquire(5).await;
        let snap = limiter.snapshot();
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.token_count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn token_quota_waits() {
        let limiter = RateLimiter::new(100, 100, MINUTE);
        let start = Instant::now();

        limiter.acquire(100).await;
        limiter.acquire(7).await;
        assert_eq!(start.elapsed(), MINUTE);
        assert_eq!(limiter.snapshot().token_count, 7);
        // Request counter was under quota and keeps counting
        assert_eq!(limiter.snapshot().request_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_every_k_calls() {
        let limiter =
            RateLimiter::new(100, 1_000_000, MINUTE).with_cooldown(2, Duration::from_secs(10));
        let start = Instant::now();

        limiter.acquire(1).await;
        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        limiter.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_serialize_on_the_window() {
        let limiter = Arc::new(RateLimiter::new(2, 1_000_000, MINUTE));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire(1).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        // Two calls per window: t=0, t=60, t=120
        assert_eq!(start.elapsed(), 2 * MINUTE);
        let snap = limiter.snapshot();
        assert_eq!(snap.total_calls, 5);
        assert_eq!(snap.request_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_acquire_leaves_counters_untouched() {
        let limiter = RateLimiter::new(2, 1_000_000, MINUTE);
        limiter.acquire(3).await;
        limiter.acquire(3).await;

        let timed_out =
            tokio::time::timeout(Duration::from_secs(1), limiter.acquire(50)).await;
        assert!(timed_out.is_err());

        let snap = limiter.snapshot();
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.token_count, 6);
        assert_eq!(snap.total_calls, 2);
    }

    #[tokio::test]
    async fn record_usage_reconciles_estimate() {
        let limiter = RateLimiter::new(10, 1_000_000, MINUTE);
        let grant = limiter.acquire(100).await;
        limiter.record_usage(grant, 40).await;
        assert_eq!(limiter.snapshot().token_count, 40);

        limiter.record_tokens(25).await;
        assert_eq!(limiter.snapshot().token_count, 65);
    }

    #[tokio::test]
    async fn overstated_estimate_never_underflows() {
        let limiter = RateLimiter::new(10, 1_000_000, MINUTE);
        let grant = limiter.acquire(100).await;
        limiter.record_usage(grant, 0).await;
        assert_eq!(limiter.snapshot().token_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn usage_after_window_reset_keeps_other_callers_tokens() {
        let limiter = Arc::new(RateLimiter::new(100, 100, MINUTE));

        let first = limiter.acquire(100).await;
        // Second caller waits out the token window, which resets the counter
        let second = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(50).await })
        };
        let second = second.await.unwrap();
        assert_eq!(limiter.snapshot().token_count, 50);

        // First caller settles its stale grant: its estimate is already gone
        limiter.record_usage(first, 30).await;
        assert_eq!(limiter.snapshot().token_count, 80);

        limiter.record_usage(second, 20).await;
        assert_eq!(limiter.snapshot().token_count, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_publishes_quota_event() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let limiter = RateLimiter::new(1, 1_000_000, MINUTE).with_event_bus(bus);

        limiter.acquire(1).await;
        limiter.acquire(1).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::QuotaWait { kind, wait_ms, .. } => {
                assert_eq!(*kind, QuotaKind::Requests);
                assert_eq!(*wait_ms, 60_000);
            }
            other => panic!("Expected QuotaWait, got: {other:?}"),
        }
    }

    #[test]
    fn from_config_defaults() {
        let limiter = RateLimiter::from_config(&RateLimitConfig::default());
        assert_eq!(limiter.max_requests, 15);
        assert_eq!(limiter.max_tokens, 450_000);
        assert_eq!(limiter.window, MINUTE);
        assert_eq!(limiter.cooldown_interval, 0);
    }
}
