// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ExecutionConfigError;
use std::{num::NonZeroUsize, time::Duration};

/// The resolved settings for one concurrent test operation.
///
/// `execution_count` is the *total* number of invocations across all workers, not a per-worker
/// count: a pool of W workers serving N > W invocations queues them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecutionConfig {
    worker_count: NonZeroUsize,
    execution_count: usize,
    timeout: Option<Duration>,
    max_random_delay: Duration,
}

impl ExecutionConfig {
    /// The default number of workers.
    pub const DEFAULT_WORKER_COUNT: usize = 2;

    /// The default number of executions.
    pub const DEFAULT_EXECUTION_COUNT: usize = 5;

    /// Creates a new config with no timeout and no random delay.
    pub fn new(worker_count: usize, execution_count: usize) -> Result<Self, ExecutionConfigError> {
        let worker_count =
            NonZeroUsize::new(worker_count).ok_or(ExecutionConfigError::ZeroWorkers)?;
        Ok(Self {
            worker_count,
            execution_count,
            timeout: None,
            max_random_delay: Duration::ZERO,
        })
    }

    /// Returns a config that runs exactly one invocation, like an ordinary test.
    pub fn single() -> Self {
        Self {
            worker_count: NonZeroUsize::MIN,
            execution_count: 1,
            timeout: None,
            max_random_delay: Duration::ZERO,
        }
    }

    /// Sets the timeout for the whole batch. A zero timeout means the batch is waited on for as
    /// long as it takes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the upper bound (exclusive) of the random delay before each invocation. Zero
    /// disables staggering.
    pub fn with_max_random_delay(mut self, max_random_delay: Duration) -> Self {
        self.max_random_delay = max_random_delay;
        self
    }

    /// Returns the configured number of workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count.get()
    }

    /// Returns the total number of invocations.
    pub fn execution_count(&self) -> usize {
        self.execution_count
    }

    /// Returns the batch timeout, or `None` if unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the upper bound of the random start delay.
    pub fn max_random_delay(&self) -> Duration {
        self.max_random_delay
    }

    /// Returns the number of workers actually used for a batch: a pool larger than the number
    /// of invocations would only sit idle.
    pub fn pool_size(&self) -> usize {
        self.worker_count.get().min(self.execution_count).max(1)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_count: NonZeroUsize::new(Self::DEFAULT_WORKER_COUNT)
                .expect("default worker count is non-zero"),
            execution_count: Self::DEFAULT_EXECUTION_COUNT,
            timeout: None,
            max_random_delay: Duration::ZERO,
        }
    }
}

/// Concurrency settings declared on a test operation.
///
/// Every field is optional: unset fields are filled in from the active
/// [`RunnerProfile`](super::RunnerProfile).
///
/// ```
/// use concurrent_runner::config::ConcurrentSettings;
/// use std::time::Duration;
///
/// let settings = ConcurrentSettings::new()
///     .executions(50)
///     .workers(10)
///     .random_delay(Duration::from_millis(500));
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConcurrentSettings {
    pub(super) workers: Option<usize>,
    pub(super) executions: Option<usize>,
    pub(super) timeout: Option<Duration>,
    pub(super) random_delay: Option<Duration>,
}

impl ConcurrentSettings {
    /// Creates settings that inherit everything from the profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the total number of invocations.
    pub fn executions(mut self, executions: usize) -> Self {
        self.executions = Some(executions);
        self
    }

    /// Sets the batch timeout. Zero means unbounded.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the maximum random delay before each invocation. Zero disables staggering.
    pub fn random_delay(mut self, random_delay: Duration) -> Self {
        self.random_delay = Some(random_delay);
        self
    }
}
