// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The result of a single invocation, and the priority rule used to combine results.
//!
//! Outcomes are ranked: [`OutcomeKind::Aborted`] > [`OutcomeKind::Failed`] >
//! [`OutcomeKind::Successful`]. When outcomes compete, only a strictly higher-priority outcome
//! replaces the one already recorded.

use crate::errors::BoxError;
use std::{error::Error, fmt};
use tracing::debug;

/// The kind of an [`Outcome`], ordered by priority.
///
/// The derived `Ord` implementation is the priority order: a greater kind wins.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum OutcomeKind {
    /// The invocation completed without error.
    Successful,

    /// The invocation failed: the body or a hook returned an error, or the body didn't return the
    /// expected error.
    Failed,

    /// The harness could not complete the invocation lifecycle.
    Aborted,
}

impl OutcomeKind {
    /// Returns the numeric priority of this kind. Higher values win.
    pub fn priority(self) -> u8 {
        match self {
            Self::Successful => 1,
            Self::Failed => 2,
            Self::Aborted => 3,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Successful => write!(f, "successful"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// The result of one invocation of a test operation.
///
/// Exactly one `Outcome` is produced per invocation that isn't skipped. Outcomes are never
/// mutated once constructed.
#[derive(Debug)]
pub enum Outcome {
    /// The invocation completed without error.
    Successful,

    /// The invocation failed with the given cause.
    Failed(BoxError),

    /// The invocation was aborted with the given cause.
    Aborted(BoxError),
}

impl Outcome {
    /// Creates a failed outcome.
    pub fn failed(cause: impl Into<BoxError>) -> Self {
        Self::Failed(cause.into())
    }

    /// Creates an aborted outcome.
    pub fn aborted(cause: impl Into<BoxError>) -> Self {
        Self::Aborted(cause.into())
    }

    /// Returns the kind of this outcome.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Successful => OutcomeKind::Successful,
            Self::Failed(_) => OutcomeKind::Failed,
            Self::Aborted(_) => OutcomeKind::Aborted,
        }
    }

    /// Returns the numeric priority of this outcome.
    #[inline]
    pub fn priority(&self) -> u8 {
        self.kind().priority()
    }

    /// Returns true if this outcome should replace `other`.
    ///
    /// Ties don't take priority: the outcome observed first wins at a given priority.
    pub fn takes_priority_over(&self, other: &Outcome) -> bool {
        self.kind() > other.kind()
    }

    /// Returns the cause, if this outcome isn't successful.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Successful => None,
            Self::Failed(cause) | Self::Aborted(cause) => Some(cause.as_ref()),
        }
    }

    /// Consumes the outcome, returning the cause if it isn't successful.
    pub fn into_cause(self) -> Option<BoxError> {
        match self {
            Self::Successful => None,
            Self::Failed(cause) | Self::Aborted(cause) => Some(cause),
        }
    }

    /// Returns true if the outcome is successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Successful)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} result", self.kind())?;
        if let Some(cause) = self.cause() {
            write!(f, " ({cause})")?;
        }
        Ok(())
    }
}

/// The result of a job: either an outcome, or nothing because the job was skipped.
#[derive(Debug)]
pub enum JobOutcome {
    /// The job produced an outcome.
    Recorded(Outcome),

    /// A hook or the body signaled that the test should be skipped, and nothing else was
    /// recorded. Skipped jobs are excluded from aggregation.
    Skipped,
}

impl JobOutcome {
    /// Returns the recorded outcome, or `None` if the job was skipped.
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Recorded(outcome) => Some(outcome),
            Self::Skipped => None,
        }
    }

    /// Returns true if the job was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl From<Outcome> for JobOutcome {
    fn from(outcome: Outcome) -> Self {
        Self::Recorded(outcome)
    }
}

/// A local fold over the candidate outcomes of a single job.
///
/// Each job is single-threaded internally, so this needs no synchronization.
#[derive(Debug)]
pub(crate) struct OutcomeRecorder {
    job_index: usize,
    current: Option<Outcome>,
}

impl OutcomeRecorder {
    pub(crate) fn new(job_index: usize) -> Self {
        Self {
            job_index,
            current: None,
        }
    }

    /// Records a candidate outcome. It replaces the current outcome only if it has strictly
    /// higher priority.
    pub(crate) fn record(&mut self, outcome: Outcome) {
        match &self.current {
            None => {
                self.current = Some(outcome);
            }
            Some(current) if outcome.takes_priority_over(current) => {
                debug!(
                    job = self.job_index,
                    "new result `{outcome}` takes priority over previous result `{current}`",
                );
                self.current = Some(outcome);
            }
            Some(current) => {
                debug!(
                    job = self.job_index,
                    "new result `{outcome}` does not take priority over existing result \
                     `{current}` and is discarded",
                );
            }
        }
    }

    /// Returns the kind of the currently recorded outcome, if any.
    pub(crate) fn current_kind(&self) -> Option<OutcomeKind> {
        self.current.as_ref().map(Outcome::kind)
    }

    pub(crate) fn finish(self) -> JobOutcome {
        match self.current {
            Some(outcome) => JobOutcome::Recorded(outcome),
            None => JobOutcome::Skipped,
        }
    }
}
