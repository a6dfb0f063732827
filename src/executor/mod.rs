//! Trial repetition
//!
//! A test class repeats its trial body a fixed number of times and stops
//! early once too many iterations in a row have failed.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// How often a trial is repeated and when to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatPolicy {
    /// Required iterations
    pub count: u32,
    /// Consecutive failed iterations that stop the loop
    pub max_consecutive_error: u32,
}

impl RepeatPolicy {
    pub const fn new(count: u32, max_consecutive_error: u32) -> Self {
        Self {
            count,
            max_consecutive_error,
        }
    }

    pub const fn scc() -> Self {
        Self::new(
            defaults::SCC_PERFORMANCE_TEST_COUNT,
            defaults::SCC_PERFORMANCE_TEST_MAX_CONSECUTIVE_ERROR,
        )
    }

    pub const fn mcc() -> Self {
        Self::new(
            defaults::MCC_PERFORMANCE_TEST_COUNT,
            defaults::MCC_PERFORMANCE_TEST_MAX_CONSECUTIVE_ERROR,
        )
    }

    pub const fn bt() -> Self {
        Self::new(
            defaults::BT_PERFORMANCE_TEST_COUNT,
            defaults::BT_PERFORMANCE_TEST_MAX_CONSECUTIVE_ERROR,
        )
    }

    /// Breaker threshold; any failure trips it in fast-fail mode
    pub fn effective_threshold(&self, fast_fail_on_any_error: bool) -> u32 {
        if fast_fail_on_any_error {
            1
        } else {
            self.max_consecutive_error.max(1)
        }
    }

    /// Iterations that must succeed for the class to pass
    pub fn required_successes(&self) -> usize {
        (f64::from(self.count) * defaults::SUCCESS_RATE_TARGET).floor() as usize
    }
}

/// What the loop should do after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    /// Every required iteration has run
    Finished,
    /// The consecutive-failure threshold was reached
    Tripped { consecutive_failures: u32 },
}

/// Counts iterations and consecutive failures
#[derive(Debug, Clone)]
pub struct ConsecutiveFailureBreaker {
    policy: RepeatPolicy,
    threshold: u32,
    consecutive_failures: u32,
    finished: u32,
}

impl ConsecutiveFailureBreaker {
    pub fn new(policy: RepeatPolicy, fast_fail_on_any_error: bool) -> Self {
        Self {
            policy,
            threshold: policy.effective_threshold(fast_fail_on_any_error),
            consecutive_failures: 0,
            finished: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn finished(&self) -> u32 {
        self.finished
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether another iteration may start
    pub fn should_run(&self) -> bool {
        self.finished < self.policy.count && self.consecutive_failures < self.threshold
    }

    /// Record a finished iteration
    pub fn record(&mut self, success: bool) -> LoopControl {
        self.finished += 1;
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }

        if self.consecutive_failures >= self.threshold {
            LoopControl::Tripped {
                consecutive_failures: self.consecutive_failures,
            }
        } else if self.finished >= self.policy.count {
            LoopControl::Finished
        } else {
            LoopControl::Continue
        }
    }
}
