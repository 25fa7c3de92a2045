// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::BoxError,
    outcome::{JobOutcome, Outcome, OutcomeKind},
};
use std::{cmp::Ordering, error, fmt};
use tracing::debug;

/// Decides which cause to keep when two outcomes of equal priority compete.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TieBreak {
    /// Keep the cause observed first. Later causes of the same priority are logged and dropped.
    #[default]
    KeepFirst,

    /// Keep the cause observed last.
    KeepLast,
}

/// The single result reported for a test case, after every invocation has been reduced.
#[derive(Debug)]
pub enum FinalOutcome {
    /// Every invocation was skipped, or none ran at all.
    Ignored,

    /// Every invocation that wasn't skipped succeeded.
    Successful,

    /// At least one invocation failed, and none aborted.
    Failed(BoxError),

    /// At least one invocation aborted.
    Aborted(BoxError),
}

impl FinalOutcome {
    /// Returns the cause of a failed or aborted outcome.
    pub fn cause(&self) -> Option<&(dyn error::Error + Send + Sync + 'static)> {
        match self {
            Self::Ignored | Self::Successful => None,
            Self::Failed(cause) | Self::Aborted(cause) => Some(cause.as_ref()),
        }
    }

    /// Returns the outcome kind, or `None` if the test case was ignored.
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            Self::Ignored => None,
            Self::Successful => Some(OutcomeKind::Successful),
            Self::Failed(_) => Some(OutcomeKind::Failed),
            Self::Aborted(_) => Some(OutcomeKind::Aborted),
        }
    }
}

impl From<Option<Outcome>> for FinalOutcome {
    fn from(outcome: Option<Outcome>) -> Self {
        match outcome {
            None => Self::Ignored,
            Some(Outcome::Successful) => Self::Successful,
            Some(Outcome::Failed(cause)) => Self::Failed(cause),
            Some(Outcome::Aborted(cause)) => Self::Aborted(cause),
        }
    }
}

impl fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignored => write!(f, "ignored"),
            Self::Successful => write!(f, "successful"),
            Self::Failed(cause) => write!(f, "failed: {cause}"),
            Self::Aborted(cause) => write!(f, "aborted: {cause}"),
        }
    }
}

/// Counts of how the invocations in a batch ended.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchSummary {
    /// The number of invocations in the batch.
    pub total: usize,

    /// The number of invocations that succeeded.
    pub successful: usize,

    /// The number of invocations that failed.
    pub failed: usize,

    /// The number of invocations that aborted.
    pub aborted: usize,

    /// The number of invocations that were skipped and excluded from the result.
    pub skipped: usize,
}

impl BatchSummary {
    /// Returns the number of invocations that produced a result, including skips.
    pub fn finished(&self) -> usize {
        self.successful + self.failed + self.aborted + self.skipped
    }

    /// Returns the number of failure or abort causes that were observed but not surfaced in the
    /// final outcome.
    pub fn suppressed_causes(&self) -> usize {
        (self.failed + self.aborted).saturating_sub(1)
    }

    fn count(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Successful => self.successful += 1,
            OutcomeKind::Failed => self.failed += 1,
            OutcomeKind::Aborted => self.aborted += 1,
        }
    }
}

/// The reduced result of a batch.
#[derive(Debug)]
pub struct BatchResult {
    /// The final outcome for the test case.
    pub outcome: FinalOutcome,

    /// How the individual invocations ended.
    pub summary: BatchSummary,
}

impl BatchResult {
    pub(crate) fn ignored(total: usize) -> Self {
        Self {
            outcome: FinalOutcome::Ignored,
            summary: BatchSummary {
                total,
                ..BatchSummary::default()
            },
        }
    }
}

/// Reduces the outcomes of a batch to a single result by priority.
///
/// Skipped invocations are excluded entirely. Of the rest, the highest-priority outcome wins:
/// aborted over failed over successful. The result is independent of arrival order except for
/// which cause is kept among equal-priority outcomes, which is controlled by [`TieBreak`].
#[derive(Debug)]
pub struct ResultAggregator {
    tie_break: TieBreak,
    current: Option<Outcome>,
    summary: BatchSummary,
}

impl ResultAggregator {
    /// Creates an aggregator for a batch of `total` invocations.
    pub fn new(total: usize) -> Self {
        Self {
            tie_break: TieBreak::default(),
            current: None,
            summary: BatchSummary {
                total,
                ..BatchSummary::default()
            },
        }
    }

    /// Sets the tie-break rule for equal-priority outcomes.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Reduces a complete sequence of job outcomes, in observation order.
    pub fn reduce(outcomes: impl IntoIterator<Item = JobOutcome>) -> BatchResult {
        let outcomes = outcomes.into_iter();
        let mut aggregator = Self::new(outcomes.size_hint().0);
        for outcome in outcomes {
            aggregator.observe(outcome);
        }
        aggregator.summary.total = aggregator.summary.total.max(aggregator.summary.finished());
        aggregator.finish()
    }

    /// Observes the outcome of one job.
    pub fn observe(&mut self, outcome: JobOutcome) {
        let outcome = match outcome {
            JobOutcome::Recorded(outcome) => outcome,
            JobOutcome::Skipped => {
                self.summary.skipped += 1;
                return;
            }
        };
        self.summary.count(outcome.kind());

        let replace = match &self.current {
            None => true,
            Some(current) => match outcome.kind().cmp(&current.kind()) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => {
                    outcome.kind() != OutcomeKind::Successful
                        && self.tie_break == TieBreak::KeepLast
                }
            },
        };

        if replace {
            if let Some(current) = &self.current {
                debug!("result `{outcome}` takes priority over `{current}`");
            }
            self.current = Some(outcome);
        } else if !outcome.is_success() {
            debug!(
                "result `{outcome}` does not take priority over `{}` and is discarded",
                self.current
                    .as_ref()
                    .map_or_else(String::new, ToString::to_string),
            );
        }
    }

    /// Returns a snapshot of the counts observed so far.
    pub fn summary(&self) -> BatchSummary {
        self.summary
    }

    /// Finishes aggregation, producing the final result.
    pub fn finish(self) -> BatchResult {
        BatchResult {
            outcome: self.current.into(),
            summary: self.summary,
        }
    }
}
