// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use log::info;
use std::time::Duration;

/// Blocks the calling thread. Swapped out in tests to record waits instead.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max_step: Duration,
    ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(30),
            Duration::from_secs(120),
            Duration::from_secs(300),
        )
    }
}

impl BackoffPolicy {
    /// A zero initial step would never accumulate toward the ceiling, so it is
    /// raised to one millisecond.
    pub fn new(initial: Duration, max_step: Duration, ceiling: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max_step: max_step.max(initial),
            ceiling,
        }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max_step(&self) -> Duration {
        self.max_step
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial,
            waited: Duration::ZERO,
            state: BackoffState::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    Idle,
    Waiting,
    Exhausted,
}

/// Backoff progress for one logical request.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    waited: Duration,
    state: BackoffState,
}

impl Backoff {
    pub fn state(&self) -> BackoffState {
        self.state
    }

    pub fn total_waited(&self) -> Duration {
        self.waited
    }

    /// Called on a throttling response. Returns how long to wait before
    /// retrying, or `None` once the next wait would push the total past the
    /// ceiling (the state is then `Exhausted` and stays there).
    pub fn on_throttled(&mut self) -> Option<Duration> {
        if self.state == BackoffState::Exhausted {
            return None;
        }
        if self.waited + self.current > self.policy.ceiling {
            self.state = BackoffState::Exhausted;
            return None;
        }

        let wait = self.current.min(self.policy.ceiling - self.waited);
        self.waited += wait;
        self.current = (self.current * 2).min(self.policy.max_step);
        self.state = BackoffState::Waiting;
        Some(wait)
    }
}

/// Caps calls to `max_requests` per `interval` with a counter and a full
/// interval sleep once the cap is hit.
#[derive(Debug, Clone)]
pub struct RequestBudget {
    max_requests: u32,
    interval: Duration,
    used: u32,
}

impl Default for RequestBudget {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RequestBudget {
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            interval,
            used: 0,
        }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    /// Takes one request slot, sleeping out the interval first if none are left.
    pub fn acquire(&mut self, sleeper: &dyn Sleeper) {
        if self.used >= self.max_requests {
            info!(
                "Reached {} API requests; sleeping {}s",
                self.max_requests,
                self.interval.as_secs()
            );
            sleeper.sleep(self.interval);
            self.used = 0;
        }
        self.used += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSleeper {
        waits: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.waits.borrow_mut().push(duration);
        }
    }

    #[test]
    fn test_default_schedule_is_bounded() {
        let mut backoff = BackoffPolicy::default().start();
        assert_eq!(backoff.state(), BackoffState::Idle);

        let mut waits = Vec::new();
        while let Some(wait) = backoff.on_throttled() {
            waits.push(wait.as_secs());
            assert_eq!(backoff.state(), BackoffState::Waiting);
        }

        assert_eq!(waits, vec![30, 60, 120]);
        assert_eq!(backoff.state(), BackoffState::Exhausted);
        assert!(backoff.total_waited() <= Duration::from_secs(300));
        assert_eq!(backoff.on_throttled(), None);
    }

    #[test]
    fn test_never_exceeds_ceiling_for_any_policy() {
        for (initial, max_step, ceiling) in [
            (1, 4, 10),
            (3, 3, 10),
            (7, 100, 10),
            (20, 40, 10),
            (2, 64, 127),
        ] {
            let policy = BackoffPolicy::new(
                Duration::from_secs(initial),
                Duration::from_secs(max_step),
                Duration::from_secs(ceiling),
            );
            let mut backoff = policy.start();
            let mut total = Duration::ZERO;
            let mut rounds = 0;
            while let Some(wait) = backoff.on_throttled() {
                total += wait;
                rounds += 1;
                assert!(wait <= policy.max_step());
                assert!(rounds < 1000, "policy never exhausts");
            }
            assert!(total <= policy.ceiling());
            assert_eq!(total, backoff.total_waited());
            assert_eq!(backoff.state(), BackoffState::Exhausted);
        }
    }

    #[test]
    fn test_zero_initial_is_clamped() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::ZERO, Duration::from_millis(5));
        let mut backoff = policy.start();
        let mut rounds = 0;
        while backoff.on_throttled().is_some() {
            rounds += 1;
        }
        assert_eq!(rounds, 5);
    }

    #[test]
    fn test_request_budget_sleeps_at_limit() {
        let sleeper = RecordingSleeper::default();
        let mut budget = RequestBudget::new(3, Duration::from_secs(60));

        for _ in 0..3 {
            budget.acquire(&sleeper);
        }
        assert!(sleeper.waits.borrow().is_empty());
        assert_eq!(budget.used(), 3);

        budget.acquire(&sleeper);
        assert_eq!(*sleeper.waits.borrow(), vec![Duration::from_secs(60)]);
        assert_eq!(budget.used(), 1);
    }
}
