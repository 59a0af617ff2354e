//! Retry pacing and cooperative cancellation for the poll cycle.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;

/// Growth curve applied to the poll delay after unsuccessful attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Every attempt waits the base interval.
    Fixed,
    /// Delay grows by `factor` per unsuccessful attempt, capped at `max`.
    Exponential {
        /// Multiplier applied per attempt.
        factor: f64,
        /// Upper bound on the delay before jitter.
        max: Duration,
    },
}

/// Poll pacing for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base wait before every capture.
    pub interval: Duration,
    /// Attempts allowed per step; `None` retries until the step completes.
    pub max_attempts: Option<u32>,
    /// Delay growth curve.
    pub backoff: Backoff,
    /// Upper bound of uniformly random delay added to each wait.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: None,
            backoff: Backoff::Fixed,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval, unbounded policy.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Returns `true` once `attempts` reaches the configured ceiling.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Delay before the next capture after `failed_attempts` unsuccessful
    /// attempts on the current step, without jitter.
    pub fn base_delay(&self, failed_attempts: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { factor, max } => {
                let exponent = i32::try_from(failed_attempts).unwrap_or(i32::MAX);
                let scaled = self.interval.as_nanos() as f64 * factor.max(1.0).powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_nanos() as f64 {
                    max.max(self.interval)
                } else {
                    Duration::from_nanos(scaled as u64)
                }
            }
        }
    }

    /// Delay before the next capture, jitter included.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        let base = self.base_delay(failed_attempts);
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Cloneable stop signal shared between a loop and its host.
///
/// Stopping wakes any thread blocked in [`StopHandle::wait`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopHandle {
    /// Creates an unstopped handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the stop flag and wakes waiters.
    pub fn stop(&self) {
        let (flag, wakeup) = &*self.inner;
        match flag.lock() {
            Ok(mut stopped) => *stopped = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        wakeup.notify_all();
    }

    /// Returns `true` once [`StopHandle::stop`] was called.
    pub fn is_stopped(&self) -> bool {
        let (flag, _) = &*self.inner;
        match flag.lock() {
            Ok(stopped) => *stopped,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleeps up to `timeout`, returning early when stopped.
    ///
    /// Returns `true` when the handle is stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, wakeup) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let Ok(mut stopped) = flag.lock() else {
            return true;
        };
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = match wakeup.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return true,
            };
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            interval: Duration::from_millis(100),
            max_attempts: Some(5),
            backoff: Backoff::Exponential {
                factor: 2.0,
                max: Duration::from_millis(350),
            },
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(350));
        assert_eq!(policy.delay(40), Duration::from_millis(350));
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(20),
            ..RetryPolicy::fixed(Duration::from_millis(50))
        };
        for _ in 0..50 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(70));
        }
    }

    #[test]
    fn unbounded_policy_is_never_exhausted() {
        assert!(!RetryPolicy::default().is_exhausted(u32::MAX));
    }

    #[test]
    fn stop_wakes_a_pending_wait() {
        let handle = StopHandle::new();
        let waiter = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                let started = Instant::now();
                (handle.wait(Duration::from_secs(30)), started.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        handle.stop();

        let (stopped, elapsed) = waiter.join().expect("waiter should finish");
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
        assert!(handle.wait(Duration::from_secs(30)));
    }

    #[test]
    fn wait_times_out_when_not_stopped() {
        assert!(!StopHandle::new().wait(Duration::from_millis(5)));
    }
}
