// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by concurrent-runner.
//!
//! Errors fall into two groups:
//!
//! * job-level causes, which are captured inside an [`InvocationJob`](crate::runner::InvocationJob)
//!   and converted into an [`Outcome`](crate::outcome::Outcome). They never cross a job boundary
//!   as anything other than a cause.
//! * batch-level errors ([`ScheduleError`]), raised by the scheduler when the batch as a whole
//!   could not be completed.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error, fmt, time::Duration};
use thiserror::Error;

/// A boxed, thread-safe error. Causes of failed and aborted outcomes are stored in this form so
/// that the source chain is preserved.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// The fixture could not be constructed.
///
/// This is a harness-level problem and is reported as an abort, never as a test failure.
#[derive(Debug, Error)]
#[error("failed to construct test fixture")]
pub struct ConstructionError {
    #[source]
    source: BoxError,
}

impl ConstructionError {
    pub(crate) fn new(source: BoxError) -> Self {
        Self { source }
    }
}

/// The phase a hook runs in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HookPhase {
    /// Runs once before all tests in a suite.
    BeforeAll,

    /// Runs on each fixture instance before the test body.
    Before,

    /// Runs on each fixture instance after the test body, regardless of how the body finished.
    After,

    /// Runs once after all tests in a suite.
    AfterAll,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeAll => write!(f, "before-all"),
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
            Self::AfterAll => write!(f, "after-all"),
        }
    }
}

/// A setup or teardown hook failed.
#[derive(Debug, Error)]
#[error("{phase} hook `{name}` failed")]
pub struct HookError {
    phase: HookPhase,
    name: String,
    #[source]
    source: BoxError,
}

impl HookError {
    pub(crate) fn new(phase: HookPhase, name: impl Into<String>, source: BoxError) -> Self {
        Self {
            phase,
            name: name.into(),
            source,
        }
    }

    /// Returns the phase the hook ran in.
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Returns the name of the hook.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A body, hook or constructor panicked.
#[derive(Clone, Debug, Error)]
#[error("panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the panic message, or a placeholder if the payload was not a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A job was interrupted while waiting out its random start delay.
#[derive(Clone, Debug, Error)]
#[error("interrupted while waiting out start delay of {}", humantime::format_duration(*.delay))]
pub struct DelayInterrupted {
    delay: Duration,
}

impl DelayInterrupted {
    pub(crate) fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

/// The test body completed normally, but an error was declared as expected.
#[derive(Clone, Debug, Error)]
#[error("expected error: {expected}")]
pub struct UnexpectedSuccess {
    expected: String,
}

impl UnexpectedSuccess {
    pub(crate) fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    /// Returns a description of the expected error.
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

/// The test body returned an error that didn't match the declared expected error.
///
/// The actual error is available through [`source`](error::Error::source).
#[derive(Debug, Error)]
#[error("unexpected error, expected <{expected}> but was <{actual}>")]
pub struct UnexpectedError {
    expected: String,
    actual: String,
    #[source]
    source: BoxError,
}

impl UnexpectedError {
    pub(crate) fn new(expected: impl Into<String>, source: BoxError) -> Self {
        Self {
            expected: expected.into(),
            actual: source.to_string(),
            source,
        }
    }

    /// Returns a description of the expected error.
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

/// The batch did not finish within its timeout.
#[derive(Clone, Debug, Error)]
#[error(
    "concurrent test invocations took longer than desired timeout ({}): {completed}/{total} finished",
    humantime::format_duration(*.timeout),
)]
pub struct TimeoutExceeded {
    timeout: Duration,
    completed: usize,
    total: usize,
}

impl TimeoutExceeded {
    pub(crate) fn new(timeout: Duration, completed: usize, total: usize) -> Self {
        Self {
            timeout,
            completed,
            total,
        }
    }

    /// Returns the timeout that was exceeded.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of jobs that had finished when the timeout elapsed.
    pub fn completed(&self) -> usize {
        self.completed
    }
}

/// The scheduling thread was interrupted while waiting for a batch.
#[derive(Clone, Debug, Error)]
#[error("interrupted while waiting for concurrent test invocations: {completed}/{total} finished")]
pub struct BatchInterrupted {
    completed: usize,
    total: usize,
}

impl BatchInterrupted {
    pub(crate) fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }
}

/// An error raised for a batch as a whole by
/// [`ExecutionScheduler::schedule`](crate::runner::ExecutionScheduler::schedule).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScheduleError {
    /// The batch did not finish in time. Reported as a failure.
    #[error(transparent)]
    Timeout(#[from] TimeoutExceeded),

    /// The scheduling thread was interrupted. Reported as an abort.
    #[error(transparent)]
    Interrupted(#[from] BatchInterrupted),

    /// The worker pool could not be created. Reported as an abort.
    #[error("failed to build worker pool")]
    PoolBuild(#[source] rayon::ThreadPoolBuildError),
}

/// The execution settings resolved to an invalid combination.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ExecutionConfigError {
    /// The worker count was zero.
    #[error("worker count may not be 0")]
    ZeroWorkers,
}

/// An error that occurred while reading or parsing the runner config.
#[derive(Debug, Error)]
#[error("failed to parse concurrent-runner config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error which indicates that a profile was requested but not known.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurred while loading the runner config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigReadError {
    /// The config file could not be parsed.
    #[error(transparent)]
    Parse(#[from] ConfigParseError),

    /// The default profile named by `default-profile` does not exist.
    #[error("default profile is invalid")]
    DefaultProfile(#[source] ProfileNotFound),
}
