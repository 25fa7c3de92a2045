// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long test cases and batches take.
//!
//! A start time is tracked with both a `SystemTime` (realtime clock, for reporting) and an
//! `Instant` (monotonic clock, for measuring). Deadlines are always computed from the monotonic
//! clock.

use std::time::{Duration, Instant, SystemTime};

#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: SystemTime,
    instant: Instant,
}

impl StopwatchStart {
    pub(crate) fn now() -> Self {
        Self {
            start_time: SystemTime::now(),
            instant: Instant::now(),
        }
    }

    /// Returns the monotonic deadline `timeout` after the start, or `None` if it overflows.
    pub(crate) fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.instant.checked_add(timeout)
    }

    pub(crate) fn end(&self) -> StopwatchEnd {
        StopwatchEnd {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchEnd {
    pub(crate) start_time: SystemTime,
    pub(crate) duration: Duration,
}
