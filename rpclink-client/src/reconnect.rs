//! Reconnection strategies
//!
//! When the peer closes the active connection without the caller asking for
//! it, the transport consults its strategy for how long to wait before the
//! next attempt, or whether to give up.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: doubling delays up to a cap, optional jitter
//! - **FixedDelay**: constant delay between attempts
//! - **NoReconnect**: give up immediately (the default for a transport)
//!
//! # Examples
//!
//! ```rust
//! use rpclink_client::ExponentialBackoff;
//! use std::time::Duration;
//!
//! // 100ms to 30s, max 10 attempts, with jitter
//! let default = ExponentialBackoff::default();
//!
//! // 1s to 60s, unlimited attempts
//! let custom = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
//! ```

use std::time::Duration;

/// Decides the delay before each reconnection attempt
///
/// `reset` is called after a successful reconnect so state accumulated over
/// one outage does not leak into the next.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before attempt number `attempt` (0-indexed), `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    fn reset(&mut self);
}

/// Exponential backoff with optional jitter
///
/// The delay for attempt `n` is `min_delay * 2^n`, capped at `max_delay`.
/// Jitter adds a random 0-25% on top.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
            current_attempt: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
            .with_max_attempts(10)
            .with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let max_ms = self.max_delay.as_millis() as u64;
        // Saturate instead of overflowing on long outages
        let delay = 2u64
            .checked_pow(attempt)
            .and_then(|factor| (self.min_delay.as_millis() as u64).checked_mul(factor))
            .map_or(max_ms, |ms| ms.min(max_ms));

        if self.jitter {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Some(Duration::from_millis(delay + jitter_ms));
        }

        Some(Duration::from_millis(delay))
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Constant delay between attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }

    fn reset(&mut self) {}
}

/// Never reconnect
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
                .with_max_attempts(5);

        assert_eq!(strategy.next_delay(0).unwrap(), Duration::from_millis(100));
        assert_eq!(strategy.next_delay(1).unwrap(), Duration::from_millis(200));
        assert_eq!(strategy.next_delay(2).unwrap(), Duration::from_millis(400));
    }

    #[test]
    fn test_exponential_backoff_caps_at_max_delay() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(strategy.next_delay(10).unwrap(), Duration::from_millis(1000));
        // Large attempt numbers saturate instead of overflowing
        assert_eq!(strategy.next_delay(200).unwrap(), Duration::from_millis(1000));
    }

    #[test]
    fn test_exponential_backoff_max_attempts() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
                .with_max_attempts(3);

        assert!(strategy.next_delay(0).is_some());
        assert!(strategy.next_delay(2).is_some());
        assert!(strategy.next_delay(3).is_none());
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        strategy.next_delay(5);
        assert_eq!(strategy.current_attempt, 5);

        strategy.reset();
        assert_eq!(strategy.current_attempt, 0);
    }

    #[test]
    fn test_exponential_backoff_jitter_bounds() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
                .with_jitter();

        for _ in 0..20 {
            let delay = strategy.next_delay(0).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_fixed_delay() {
        let mut strategy = FixedDelay::new(Duration::from_secs(1)).with_max_attempts(2);

        assert_eq!(strategy.next_delay(0).unwrap(), Duration::from_secs(1));
        assert_eq!(strategy.next_delay(1).unwrap(), Duration::from_secs(1));
        assert!(strategy.next_delay(2).is_none());
    }

    #[test]
    fn test_no_reconnect() {
        let mut strategy = NoReconnect;
        assert!(strategy.next_delay(0).is_none());
    }
}
