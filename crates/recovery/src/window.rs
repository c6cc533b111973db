//! Per-component sliding-window attempt counter.

use serde::{Deserialize, Serialize};

/// Limits applied to every [`ActionCounter`], already converted to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    pub max_count: u32,
    pub window_secs: i64,
    /// Minimum spacing between two attempts. Zero disables the check.
    pub retry_gap_secs: i64,
    pub max_lifetime_count: u32,
}

/// Why an attempt was refused. A denial is a normal "not now", not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    LifetimeCapReached,
    WindowCapReached,
    RetryGapNotMet,
}

/// Attempt bookkeeping for one component.
///
/// Field names match the JSON shape operators see in `get_actions_copy`
/// dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCounter {
    /// `None` until the first granted attempt.
    pub last_attempt: Option<i64>,
    pub count: u32,
    pub last_reset: i64,
    pub lifetime_count: u32,
    pub warned_last_attempt: bool,
    pub warned_last_reset: bool,
    pub warned_threshold_reached: bool,
}

impl ActionCounter {
    fn window_expired(&self, now: i64, window_secs: i64) -> bool {
        now - self.last_reset >= window_secs
    }

    fn count_in_window(&self, now: i64, window_secs: i64) -> u32 {
        if self.window_expired(now, window_secs) {
            0
        } else {
            self.count
        }
    }

    /// Decide whether an attempt at `now` would be granted without recording it.
    pub fn check(&self, now: i64, limits: &WindowLimits) -> Result<(), Denial> {
        if self.lifetime_count >= limits.max_lifetime_count {
            return Err(Denial::LifetimeCapReached);
        }
        if self.count_in_window(now, limits.window_secs) >= limits.max_count {
            return Err(Denial::WindowCapReached);
        }
        if let Some(last_attempt) = self.last_attempt {
            if limits.retry_gap_secs > 0 && now - last_attempt < limits.retry_gap_secs {
                return Err(Denial::RetryGapNotMet);
            }
        }
        Ok(())
    }

    /// Record an attempt at `now` if the limits allow it.
    ///
    /// The window is reset first when `window_secs` have passed since the
    /// last reset, so a denial caused by an exhausted window clears as soon
    /// as the window rolls over. The lifetime cap never rolls over.
    pub fn attempt(&mut self, now: i64, limits: &WindowLimits) -> Result<(), Denial> {
        if self.window_expired(now, limits.window_secs) {
            self.count = 0;
            self.last_reset = now;
            self.warned_last_reset = false;
        }

        self.check(now, limits)?;

        self.count += 1;
        self.lifetime_count += 1;
        self.last_attempt = Some(now);
        self.warned_last_attempt = false;
        Ok(())
    }

    /// Remember that `denial` was reported. Returns `true` the first time a
    /// given kind of denial is seen so callers warn once and stay quiet after.
    pub fn note_denial(&mut self, denial: Denial) -> bool {
        let flag = match denial {
            Denial::LifetimeCapReached => &mut self.warned_threshold_reached,
            Denial::WindowCapReached => &mut self.warned_last_reset,
            Denial::RetryGapNotMet => &mut self.warned_last_attempt,
        };
        !std::mem::replace(flag, true)
    }

    /// Whether either the lifetime cap or the current window cap is exhausted.
    pub fn limit_reached(&self, now: i64, limits: &WindowLimits) -> bool {
        self.lifetime_count >= limits.max_lifetime_count
            || self.count_in_window(now, limits.window_secs) >= limits.max_count
    }

    /// True when more than one window has elapsed since the last attempt,
    /// or no attempt was ever made.
    pub fn is_stale(&self, now: i64, window_secs: i64) -> bool {
        self.last_attempt
            .is_none_or(|last_attempt| now - last_attempt > window_secs)
    }

    /// Clear the lifetime counter after the lifetime cap was reconfigured.
    pub fn reset_lifetime(&mut self) {
        self.lifetime_count = 0;
        self.warned_threshold_reached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: WindowLimits = WindowLimits {
        max_count: 2,
        window_secs: 300,
        retry_gap_secs: 60,
        max_lifetime_count: 4,
    };

    #[test]
    fn test_window_cap_then_reset() {
        let mut counter = ActionCounter::default();

        assert_eq!(counter.attempt(1003, &LIMITS), Ok(()));
        assert_eq!(counter.attempt(1004, &LIMITS), Err(Denial::RetryGapNotMet));
        assert_eq!(counter.attempt(1071, &LIMITS), Ok(()));
        assert_eq!(counter.attempt(1150, &LIMITS), Err(Denial::WindowCapReached));

        // 1003 + 300: window rolls over
        assert_eq!(counter.attempt(1303, &LIMITS), Ok(()));
        assert_eq!(counter.last_reset, 1303);
        assert_eq!(counter.count, 1);
        assert_eq!(counter.lifetime_count, 3);
    }

    #[test]
    fn test_lifetime_cap_survives_window_reset() {
        let mut counter = ActionCounter::default();
        let mut now = 1000;
        for _ in 0..4 {
            assert_eq!(counter.attempt(now, &LIMITS), Ok(()));
            now += 400;
        }
        assert_eq!(counter.attempt(now, &LIMITS), Err(Denial::LifetimeCapReached));
        assert_eq!(
            counter.attempt(now + 10_000, &LIMITS),
            Err(Denial::LifetimeCapReached)
        );
        assert_eq!(counter.lifetime_count, 4);
    }

    #[test]
    fn test_check_does_not_mutate() {
        let mut counter = ActionCounter::default();
        counter.attempt(1000, &LIMITS).unwrap();
        let before = counter.clone();

        for now in [1001, 1100, 2000] {
            let _ = counter.check(now, &LIMITS);
        }
        assert_eq!(counter, before);
    }

    #[test]
    fn test_check_sees_expired_window_as_empty() {
        let mut counter = ActionCounter::default();
        counter.attempt(1000, &LIMITS).unwrap();
        counter.attempt(1100, &LIMITS).unwrap();

        assert_eq!(counter.check(1200, &LIMITS), Err(Denial::WindowCapReached));
        assert!(counter.limit_reached(1200, &LIMITS));
        assert_eq!(counter.check(1300, &LIMITS), Ok(()));
        assert!(!counter.limit_reached(1300, &LIMITS));
    }

    #[test]
    fn test_zero_gap_allows_back_to_back_attempts() {
        let limits = WindowLimits {
            retry_gap_secs: 0,
            ..LIMITS
        };
        let mut counter = ActionCounter::default();
        assert_eq!(counter.attempt(1500, &limits), Ok(()));
        assert_eq!(counter.attempt(1500, &limits), Ok(()));
        assert_eq!(counter.attempt(1501, &limits), Err(Denial::WindowCapReached));
    }

    #[test]
    fn test_note_denial_warns_once_per_kind() {
        let mut counter = ActionCounter::default();
        assert!(counter.note_denial(Denial::RetryGapNotMet));
        assert!(!counter.note_denial(Denial::RetryGapNotMet));
        assert!(counter.note_denial(Denial::WindowCapReached));

        // a granted attempt re-arms the gap warning
        counter.attempt(5000, &LIMITS).unwrap();
        assert!(counter.note_denial(Denial::RetryGapNotMet));
    }

    #[test]
    fn test_is_stale() {
        let counter = ActionCounter {
            last_attempt: Some(1),
            ..ActionCounter::default()
        };
        assert!(!counter.is_stale(3601, 3600));
        assert!(counter.is_stale(3602, 3600));
        assert!(ActionCounter::default().is_stale(0, 3600));
    }

    #[test]
    fn test_retry_gap_applies_from_time_zero() {
        let mut counter = ActionCounter::default();
        assert_eq!(counter.attempt(0, &LIMITS), Ok(()));
        assert_eq!(counter.last_attempt, Some(0));
        assert_eq!(counter.attempt(1, &LIMITS), Err(Denial::RetryGapNotMet));
        assert_eq!(counter.attempt(60, &LIMITS), Ok(()));
    }
}
