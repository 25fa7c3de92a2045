// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{
        BoxError, ConstructionError, DelayInterrupted, HookError, HookPhase, PanicError,
        UnexpectedError, UnexpectedSuccess,
    },
    fixture::{Lifecycle, Skip, TestOperation},
    helpers::panic_message,
    outcome::{JobOutcome, Outcome, OutcomeRecorder},
    signal::{InterruptHandle, Interrupted},
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Duration,
};
use tracing::debug;

/// One invocation of a test operation on a fresh fixture instance.
///
/// A job runs through these states in order, stopping early where noted:
///
/// 1. **Delaying**: waits out its random start delay. An interrupt here aborts the job.
/// 2. **Constructing**: creates the fixture. Any failure aborts the job, and no hooks run.
/// 3. **Running pre-hooks**: a failure records a failed outcome and the body is skipped.
/// 4. **Running the body**, checked against the declared expected error.
/// 5. **Running post-hooks**: always, once the fixture exists. Failures are recorded only if
///    they outrank what's already been recorded.
///
/// A skip signal from a pre-hook or the body ends the job without recording anything, though
/// post-hooks still run.
#[derive_where::derive_where(Debug)]
pub struct InvocationJob<F> {
    index: usize,
    lifecycle: Arc<Lifecycle<F>>,
    operation: Arc<TestOperation<F>>,
    delay: Duration,
    interrupt: Option<InterruptHandle>,
}

impl<F> InvocationJob<F> {
    /// Creates a new job with no start delay.
    pub fn new(index: usize, lifecycle: Arc<Lifecycle<F>>, operation: Arc<TestOperation<F>>) -> Self {
        Self {
            index,
            lifecycle,
            operation,
            delay: Duration::ZERO,
            interrupt: None,
        }
    }

    /// Sets the delay to wait before constructing the fixture.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the start delay interruptible through the given handle.
    pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Returns the index of this job within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the start delay of this job.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs the job to completion on the current thread.
    ///
    /// Never panics on behalf of user code: panics in the constructor, hooks, body, or the
    /// fixture's destructor are caught and converted into outcomes.
    pub fn run(self) -> JobOutcome {
        let mut recorder = OutcomeRecorder::new(self.index);

        if !self.delay.is_zero() {
            debug!(job = self.index, "delaying start by {:?}", self.delay);
            if self.wait_out_delay().is_err() {
                debug!(job = self.index, "interrupted while delaying");
                recorder.record(Outcome::aborted(DelayInterrupted::new(self.delay)));
                return recorder.finish();
            }
        }

        debug!(job = self.index, "constructing fixture");
        let mut fixture = match invoke(|| self.lifecycle.construct()) {
            Ok(fixture) => fixture,
            Err(thrown) => {
                recorder.record(Outcome::aborted(ConstructionError::new(thrown.into_error())));
                return recorder.finish();
            }
        };

        if self.run_before_hooks(&mut fixture, &mut recorder) {
            self.run_body(&mut fixture, &mut recorder);
        }
        self.run_after_hooks(&mut fixture, &mut recorder);

        if let Err(thrown) = invoke(move || {
            drop(fixture);
            Ok(())
        }) {
            recorder.record(Outcome::failed(thrown.into_error()));
        }

        debug!(
            job = self.index,
            "finished with {}",
            recorder
                .current_kind()
                .map_or_else(|| "no result (skipped)".to_owned(), |kind| format!("{kind} result")),
        );
        recorder.finish()
    }

    fn wait_out_delay(&self) -> Result<(), Interrupted> {
        match &self.interrupt {
            Some(interrupt) => interrupt.sleep(self.delay),
            None => {
                thread::sleep(self.delay);
                Ok(())
            }
        }
    }

    // Returns false if the body should not run.
    fn run_before_hooks(&self, fixture: &mut F, recorder: &mut OutcomeRecorder) -> bool {
        for hook in self.lifecycle.before_hooks() {
            match invoke(|| hook.call(fixture)) {
                Ok(()) => {}
                Err(Thrown::Skip(skip)) => {
                    debug!(job = self.index, hook = hook.name(), "skipped: {}", skip.reason());
                    return false;
                }
                Err(Thrown::Error(error)) => {
                    recorder.record(Outcome::failed(HookError::new(
                        HookPhase::Before,
                        hook.name(),
                        error,
                    )));
                    return false;
                }
            }
        }
        true
    }

    fn run_body(&self, fixture: &mut F, recorder: &mut OutcomeRecorder) {
        debug!(job = self.index, "running `{}`", self.operation.name());
        let expected = self.operation.expected_error();
        match (invoke(|| self.operation.call(fixture)), expected) {
            (Ok(()), None) => recorder.record(Outcome::Successful),
            (Ok(()), Some(expected)) => {
                recorder.record(Outcome::failed(UnexpectedSuccess::new(expected.description())))
            }
            (Err(Thrown::Skip(skip)), _) => {
                debug!(job = self.index, "skipped: {}", skip.reason());
            }
            (Err(Thrown::Error(error)), None) => recorder.record(Outcome::Failed(error)),
            (Err(Thrown::Error(error)), Some(expected)) => {
                if expected.matches(&*error) {
                    recorder.record(Outcome::Successful);
                } else {
                    recorder.record(Outcome::failed(UnexpectedError::new(
                        expected.description(),
                        error,
                    )));
                }
            }
        }
    }

    fn run_after_hooks(&self, fixture: &mut F, recorder: &mut OutcomeRecorder) {
        for hook in self.lifecycle.after_hooks() {
            match invoke(|| hook.call(fixture)) {
                Ok(()) => {}
                // There's nothing left to skip.
                Err(Thrown::Skip(skip)) => {
                    debug!(
                        job = self.index,
                        hook = hook.name(),
                        "ignoring skip from after hook: {}",
                        skip.reason(),
                    );
                }
                Err(Thrown::Error(error)) => {
                    recorder.record(Outcome::failed(HookError::new(
                        HookPhase::After,
                        hook.name(),
                        error,
                    )));
                }
            }
        }
    }
}

/// What user code "threw", either by returning an error or by panicking.
enum Thrown {
    Skip(Skip),
    Error(BoxError),
}

impl Thrown {
    fn from_error(error: BoxError) -> Self {
        match error.downcast::<Skip>() {
            Ok(skip) => Self::Skip(*skip),
            Err(error) => Self::Error(error),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<Skip>() {
            Ok(skip) => Self::Skip(*skip),
            Err(payload) => Self::Error(Box::new(PanicError::new(panic_message(&*payload)))),
        }
    }

    fn into_error(self) -> BoxError {
        match self {
            Self::Skip(skip) => Box::new(skip),
            Self::Error(error) => error,
        }
    }
}

fn invoke<T>(f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, Thrown> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Thrown::from_error(error)),
        Err(payload) => Err(Thrown::from_panic(payload)),
    }
}
