//! Adaptive call spacing built on governor.
//!
//! The limiter enforces a minimum interval between upstream calls and widens
//! that interval while the observed error rate stays high, narrowing it back
//! toward the configured base once calls succeed again.

use crate::config::RateLimitConfig;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Widest spacing, as a multiple of the base interval.
const MAX_BACKOFF_FACTOR: u32 = 4;

/// Minimum-spacing scheduler that adapts to upstream error rates.
pub struct AdaptiveRateLimiter {
    /// Underlying governor limiter; `None` disables spacing
    limiter: Option<DefaultDirectRateLimiter>,
    /// Configured spacing
    base_interval: Duration,
    /// Spacing currently enforced
    current_interval: Duration,
    /// Recent call outcomes, `true` for success
    outcomes: VecDeque<bool>,
    window_size: usize,
    error_threshold: f64,
    samples_since_adjustment: usize,
}

impl AdaptiveRateLimiter {
    /// Create a limiter that spaces calls by at least `min_interval`.
    pub fn new(min_interval: Duration, window_size: usize, error_threshold: f64) -> Self {
        Self {
            limiter: build_limiter(min_interval),
            base_interval: min_interval,
            current_interval: min_interval,
            outcomes: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            error_threshold: error_threshold.clamp(0.0, 1.0),
            samples_since_adjustment: 0,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.error_window,
            config.error_threshold,
        )
    }

    /// Limiter with a fixed spacing and no adaptation.
    pub fn fixed(min_interval: Duration) -> Self {
        Self::new(min_interval, 1, 1.0)
    }

    /// Wait until the next call is allowed.
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Record the outcome of a call for adaptive adjustment.
    pub fn record_request_result(&mut self, success: bool) {
        self.outcomes.push_back(success);
        while self.outcomes.len() > self.window_size {
            self.outcomes.pop_front();
        }
        self.samples_since_adjustment += 1;

        if self.should_adjust() {
            self.adjust_interval();
        }
    }

    pub fn record_success(&mut self) {
        self.record_request_result(true);
    }

    pub fn record_failure(&mut self) {
        self.record_request_result(false);
    }

    fn should_adjust(&self) -> bool {
        self.limiter.is_some()
            && self.window_size > 1
            && self.outcomes.len() >= self.window_size / 2
            && self.samples_since_adjustment >= self.window_size / 2
    }

    /// Widen or narrow the spacing based on the current error rate.
    fn adjust_interval(&mut self) {
        let error_rate = self.error_rate();
        let old_interval = self.current_interval;
        let ceiling = self.base_interval * MAX_BACKOFF_FACTOR;

        if error_rate > self.error_threshold {
            self.current_interval = (self.current_interval * 2).min(ceiling);
            if self.current_interval != old_interval {
                warn!(
                    "High error rate {:.2}%, widening call spacing from {:?} to {:?}",
                    error_rate * 100.0,
                    old_interval,
                    self.current_interval
                );
            }
        } else if error_rate < self.error_threshold * 0.5 {
            self.current_interval = (self.current_interval / 2).max(self.base_interval);
            if self.current_interval != old_interval {
                debug!(
                    "Low error rate {:.2}%, narrowing call spacing from {:?} to {:?}",
                    error_rate * 100.0,
                    old_interval,
                    self.current_interval
                );
            }
        }

        if self.current_interval != old_interval {
            let limiter = build_limiter(self.current_interval);
            // A fresh bucket starts full; spend its permit so the next
            // acquire still waits one interval.
            if let Some(limiter) = &limiter {
                let _ = limiter.check();
            }
            self.limiter = limiter;
        }
        self.samples_since_adjustment = 0;
    }

    fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let errors = self.outcomes.iter().filter(|ok| !**ok).count();
        errors as f64 / self.outcomes.len() as f64
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn get_stats(&self) -> RateLimitStats {
        RateLimitStats {
            base_interval: self.base_interval,
            current_interval: self.current_interval,
            error_rate: self.error_rate(),
            total_requests: self.outcomes.len(),
            successful_requests: self.outcomes.iter().filter(|ok| **ok).count(),
        }
    }
}

fn build_limiter(interval: Duration) -> Option<DefaultDirectRateLimiter> {
    Quota::with_period(interval).map(RateLimiter::direct)
}

/// Rate limiting statistics.
#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub base_interval: Duration,
    pub current_interval: Duration,
    pub error_rate: f64,
    pub total_requests: usize,
    pub successful_requests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_limiter_creation() {
        let limiter = AdaptiveRateLimiter::new(Duration::from_millis(100), 10, 0.2);

        assert_eq!(limiter.base_interval, Duration::from_millis(100));
        assert_eq!(limiter.current_interval(), Duration::from_millis(100));
        assert!(limiter.limiter.is_some());
    }

    #[test]
    fn test_zero_interval_disables_spacing() {
        let limiter = AdaptiveRateLimiter::fixed(Duration::ZERO);
        assert!(limiter.limiter.is_none());
    }

    #[tokio::test]
    async fn test_acquire_enforces_spacing() {
        let limiter = AdaptiveRateLimiter::fixed(Duration::from_millis(40));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // First permit is immediate, the next two wait one interval each
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_spacing_survives_widening() {
        let mut limiter = AdaptiveRateLimiter::new(Duration::from_millis(100), 2, 0.2);

        limiter.acquire().await;
        let start = Instant::now();
        limiter.record_failure();
        assert_eq!(limiter.current_interval(), Duration::from_millis(200));
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[test]
    fn test_error_rate_tracking() {
        let mut limiter = AdaptiveRateLimiter::new(Duration::from_millis(10), 10, 0.2);

        for _ in 0..8 {
            limiter.record_success();
        }
        limiter.record_failure();
        limiter.record_failure();

        let stats = limiter.get_stats();
        assert_eq!(stats.total_requests, 10);
        assert_eq!(stats.successful_requests, 8);
        assert!((stats.error_rate - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_spacing_widens_on_errors_and_is_capped() {
        let mut limiter = AdaptiveRateLimiter::new(Duration::from_millis(10), 4, 0.2);

        for _ in 0..20 {
            limiter.record_failure();
        }

        assert_eq!(limiter.current_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_spacing_recovers_to_base() {
        let mut limiter = AdaptiveRateLimiter::new(Duration::from_millis(10), 4, 0.2);

        for _ in 0..4 {
            limiter.record_failure();
        }
        assert!(limiter.current_interval() > Duration::from_millis(10));

        for _ in 0..20 {
            limiter.record_success();
        }
        assert_eq!(limiter.current_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_window_size_limit() {
        let mut limiter = AdaptiveRateLimiter::new(Duration::from_millis(10), 5, 0.2);

        for _ in 0..12 {
            limiter.record_success();
        }

        assert_eq!(limiter.outcomes.len(), 5);
    }

    #[test]
    fn test_fixed_limiter_never_adapts() {
        let mut limiter = AdaptiveRateLimiter::fixed(Duration::from_millis(10));

        for _ in 0..10 {
            limiter.record_failure();
        }

        assert_eq!(limiter.current_interval(), Duration::from_millis(10));
    }
}
