// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{BatchResult, BatchSummary, ExecutionScheduler, FinalOutcome, TieBreak};
use crate::{
    config::{ExecutionConfig, RunnerProfile},
    errors::{HookError, HookPhase, ScheduleError},
    fixture::{SuiteHook, TestCaseId, TestOperation, TestSuite},
    reporter::TestEvent,
    signal::InterruptHandle,
    stopwatch::StopwatchStart,
};
use std::{convert::Infallible, error, fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct ConcurrentRunnerBuilder {
    seed: Option<u64>,
    interrupt: Option<InterruptHandle>,
    tie_break: TieBreak,
}

impl ConcurrentRunnerBuilder {
    /// Draws start delays from a generator seeded with `seed`, rather than from the operating
    /// system.
    pub fn set_seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the handle used to interrupt the run.
    ///
    /// Once triggered, the batch being waited on is aborted and no further tests are started.
    pub fn set_interrupt(&mut self, interrupt: InterruptHandle) -> &mut Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Sets the tie-break rule used when reducing equal-priority outcomes.
    pub fn set_tie_break(&mut self, tie_break: TieBreak) -> &mut Self {
        self.tie_break = tie_break;
        self
    }

    /// Creates a new test runner that resolves settings against `profile`.
    pub fn build<'cfg>(&self, profile: RunnerProfile<'cfg>) -> ConcurrentRunner<'cfg> {
        let scheduler = match self.seed {
            Some(seed) => ExecutionScheduler::with_seed(seed),
            None => ExecutionScheduler::new(),
        };
        let mut scheduler = scheduler.with_tie_break(self.tie_break);
        if let Some(interrupt) = &self.interrupt {
            scheduler = scheduler.with_interrupt(interrupt.clone());
        }

        ConcurrentRunner {
            profile,
            scheduler,
            interrupt: self.interrupt.clone(),
        }
    }
}

/// Runs the test operations of a suite, each as a concurrent batch.
#[derive(Debug)]
pub struct ConcurrentRunner<'cfg> {
    profile: RunnerProfile<'cfg>,
    scheduler: ExecutionScheduler,
    interrupt: Option<InterruptHandle>,
}

impl ConcurrentRunner<'_> {
    /// Executes the tests in `suite` in declared order.
    ///
    /// The callback is called with the results of each test.
    pub fn execute<F, C>(&mut self, suite: &TestSuite<F>, mut callback: C) -> RunStats
    where
        F: 'static,
        C: FnMut(TestEvent<'_>),
    {
        match self.try_execute::<F, Infallible, _>(suite, |event| {
            callback(event);
            Ok(())
        }) {
            Ok(run_stats) => run_stats,
            Err(never) => match never {},
        }
    }

    /// Executes the tests in `suite` in declared order.
    ///
    /// Accepts a callback that is called with the results of each test. If the callback returns
    /// an error, the callback is no longer called and no further tests are started, but
    /// `after_all` hooks still run. The first error is returned.
    pub fn try_execute<F, E, C>(&mut self, suite: &TestSuite<F>, callback: C) -> Result<RunStats, E>
    where
        F: 'static,
        C: FnMut(TestEvent<'_>) -> Result<(), E>,
    {
        let mut ctx = CallbackContext::new(callback, suite.tests().len());
        info!(
            "running suite `{}` ({} tests) with profile `{}`",
            suite.name(),
            suite.tests().len(),
            self.profile.name(),
        );
        ctx.run_started(suite.name());

        match run_before_all(suite.before_all_hooks()) {
            Ok(()) => {
                for (position, operation) in suite.tests().enumerate() {
                    if ctx.is_canceled() {
                        break;
                    }
                    if self.is_interrupted() {
                        let not_run = suite.tests().len() - position;
                        warn!("run interrupted, {not_run} tests not run");
                        ctx.run_interrupted(not_run);
                        break;
                    }
                    self.run_test(suite, operation, &mut ctx);
                }
            }
            Err(error) => {
                warn!("{error}, aborting {} tests", suite.tests().len());
                ctx.suite_hook_failed(suite.name(), &error);
                for operation in suite.tests() {
                    let id = TestCaseId {
                        suite: suite.name(),
                        name: operation.name(),
                    };
                    ctx.test_not_run(id, &error);
                }
            }
        }

        for error in run_after_all(suite.after_all_hooks()) {
            warn!("{error}");
            ctx.suite_hook_failed(suite.name(), &error);
        }

        ctx.run_finished()
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(InterruptHandle::is_interrupted)
    }

    fn run_test<F, E, C>(
        &mut self,
        suite: &TestSuite<F>,
        operation: &Arc<TestOperation<F>>,
        ctx: &mut CallbackContext<C, E>,
    ) where
        F: 'static,
        C: FnMut(TestEvent<'_>) -> Result<(), E>,
    {
        let id = TestCaseId {
            suite: suite.name(),
            name: operation.name(),
        };
        if operation.is_ignored() {
            debug!("{id} is ignored");
            ctx.test_ignored(id);
            return;
        }

        let config = match operation.concurrency() {
            None => ExecutionConfig::single(),
            Some(settings) => match self.profile.resolve(settings) {
                Ok(config) => config,
                Err(error) => {
                    ctx.test_not_run(id, &error);
                    return;
                }
            },
        };
        if config.execution_count() == 0 {
            debug!("{id} has an execution count of 0");
            ctx.test_ignored(id);
            return;
        }

        ctx.test_started(id, Some(config));
        let stopwatch = StopwatchStart::now();
        let (status, summary) = match self
            .scheduler
            .schedule(suite.lifecycle(), operation, &config)
        {
            Ok(BatchResult { outcome, summary }) => {
                let status = match &outcome {
                    FinalOutcome::Ignored => {
                        ctx.emit(TestEvent::TestIgnored { id });
                        TestStatus::Ignored
                    }
                    FinalOutcome::Successful => TestStatus::Passed,
                    FinalOutcome::Failed(cause) => {
                        ctx.emit(TestEvent::TestFailure { id, cause: &**cause });
                        TestStatus::Failed
                    }
                    FinalOutcome::Aborted(cause) => {
                        ctx.emit(TestEvent::TestAborted { id, cause: &**cause });
                        TestStatus::Aborted
                    }
                };
                (status, Some(summary))
            }
            Err(ScheduleError::Timeout(error)) => {
                ctx.run_stats.timed_out += 1;
                ctx.emit(TestEvent::TestFailure { id, cause: &error });
                (TestStatus::Failed, None)
            }
            Err(error) => {
                ctx.emit(TestEvent::TestAborted { id, cause: &error });
                (TestStatus::Aborted, None)
            }
        };
        ctx.test_finished(id, status, summary, stopwatch.end().duration);
    }
}

fn run_before_all(hooks: &[SuiteHook]) -> Result<(), HookError> {
    for hook in hooks {
        debug!("running before-all hook `{}`", hook.name());
        hook.call()
            .map_err(|error| HookError::new(HookPhase::BeforeAll, hook.name(), error))?;
    }
    Ok(())
}

// Every after-all hook runs, even if an earlier one failed.
fn run_after_all(hooks: &[SuiteHook]) -> Vec<HookError> {
    hooks
        .iter()
        .filter_map(|hook| {
            debug!("running after-all hook `{}`", hook.name());
            hook.call()
                .err()
                .map(|error| HookError::new(HookPhase::AfterAll, hook.name(), error))
        })
        .collect()
}

/// The status of a test case once it has finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TestStatus {
    /// Every invocation that wasn't skipped succeeded.
    Passed,

    /// The test case failed, or its batch timed out.
    Failed,

    /// The test case was aborted.
    Aborted,

    /// Every invocation was skipped.
    Ignored,
}

impl TestStatus {
    /// Returns true if the test case didn't fail or abort.
    pub fn is_success(self) -> bool {
        match self {
            TestStatus::Passed | TestStatus::Ignored => true,
            TestStatus::Failed | TestStatus::Aborted => false,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Aborted => write!(f, "aborted"),
            TestStatus::Ignored => write!(f, "ignored"),
        }
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests in the suite.
    ///
    /// If the run is interrupted or canceled, this will be more than `final_run_count`.
    pub initial_run_count: usize,

    /// The total number of tests that were processed, including ignored tests.
    pub final_run_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed. Includes `timed_out`.
    pub failed: usize,

    /// The number of tests whose batch exceeded its timeout.
    pub timed_out: usize,

    /// The number of tests that were aborted.
    pub aborted: usize,

    /// The number of tests that were ignored.
    pub ignored: usize,

    /// The number of `before_all` and `after_all` hooks that failed.
    pub suite_hook_failures: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * the run was interrupted or canceled: the initial run count is greater than the final
    ///   run count
    /// * any tests failed or were aborted
    /// * any suite-level hooks failed
    pub fn is_success(&self) -> bool {
        if self.initial_run_count > self.final_run_count {
            return false;
        }
        self.failed == 0 && self.aborted == 0 && self.suite_hook_failures == 0
    }

    fn on_test_finished(&mut self, status: TestStatus) {
        self.final_run_count += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Aborted => self.aborted += 1,
            TestStatus::Ignored => self.ignored += 1,
        }
    }
}

struct CallbackContext<C, E> {
    callback: C,
    stopwatch: StopwatchStart,
    run_stats: RunStats,
    first_error: Option<E>,
}

impl<C, E> CallbackContext<C, E>
where
    C: FnMut(TestEvent<'_>) -> Result<(), E>,
{
    fn new(callback: C, initial_run_count: usize) -> Self {
        Self {
            callback,
            stopwatch: StopwatchStart::now(),
            run_stats: RunStats {
                initial_run_count,
                ..RunStats::default()
            },
            first_error: None,
        }
    }

    fn is_canceled(&self) -> bool {
        self.first_error.is_some()
    }

    // Once the callback has failed, it is no longer called.
    fn emit(&mut self, event: TestEvent<'_>) {
        if self.first_error.is_none() {
            if let Err(error) = (self.callback)(event) {
                self.first_error = Some(error);
            }
        }
    }

    fn run_started(&mut self, suite: &str) {
        let test_count = self.run_stats.initial_run_count;
        self.emit(TestEvent::RunStarted { suite, test_count });
    }

    fn suite_hook_failed(&mut self, suite: &str, error: &HookError) {
        self.run_stats.suite_hook_failures += 1;
        self.emit(TestEvent::SuiteHookFailed { suite, error });
    }

    fn test_started(&mut self, id: TestCaseId<'_>, config: Option<ExecutionConfig>) {
        self.emit(TestEvent::TestStarted { id, config });
    }

    fn test_ignored(&mut self, id: TestCaseId<'_>) {
        self.run_stats.on_test_finished(TestStatus::Ignored);
        self.emit(TestEvent::TestIgnored { id });
    }

    // Reports a test that was aborted before its batch could be scheduled.
    fn test_not_run(&mut self, id: TestCaseId<'_>, cause: &(dyn error::Error + 'static)) {
        self.test_started(id, None);
        self.emit(TestEvent::TestAborted { id, cause });
        self.test_finished(id, TestStatus::Aborted, None, Duration::ZERO);
    }

    fn test_finished(
        &mut self,
        id: TestCaseId<'_>,
        status: TestStatus,
        summary: Option<BatchSummary>,
        elapsed: Duration,
    ) {
        debug!("{id} finished: {status}");
        self.run_stats.on_test_finished(status);
        self.emit(TestEvent::TestFinished {
            id,
            status,
            summary,
            elapsed,
        });
    }

    fn run_interrupted(&mut self, not_run: usize) {
        self.emit(TestEvent::RunInterrupted { not_run });
    }

    fn run_finished(mut self) -> Result<RunStats, E> {
        let stopwatch_end = self.stopwatch.end();
        let run_stats = self.run_stats;
        self.emit(TestEvent::RunFinished {
            start_time: stopwatch_end.start_time,
            elapsed: stopwatch_end.duration,
            run_stats,
        });
        match self.first_error {
            Some(error) => Err(error),
            None => Ok(run_stats),
        }
    }
}
