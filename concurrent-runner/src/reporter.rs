// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted during a run, and a reporter that renders them as human-readable lines.

use crate::{
    config::ExecutionConfig,
    errors::HookError,
    fixture::TestCaseId,
    helpers::plural,
    runner::{BatchSummary, RunStats, TestStatus},
};
use owo_colors::{OwoColorize, Style};
use std::{
    error,
    io::{self, Write},
    time::{Duration, SystemTime},
};
use swrite::{SWrite, swrite, swriteln};

/// A test event.
///
/// Events are produced by a [`ConcurrentRunner`](crate::runner::ConcurrentRunner) and consumed
/// by a callback. Each test case produces exactly one [`TestStarted`](Self::TestStarted) and one
/// [`TestFinished`](Self::TestFinished), however many invocations its batch ran, unless it was
/// ignored up front.
#[derive(Debug)]
pub enum TestEvent<'a> {
    /// The test run started.
    RunStarted {
        /// The name of the suite.
        suite: &'a str,

        /// The number of tests in the suite.
        test_count: usize,
    },

    /// A suite-level hook failed.
    ///
    /// If a `before_all` hook fails, every test in the suite is then reported as aborted.
    SuiteHookFailed {
        /// The name of the suite.
        suite: &'a str,

        /// The hook error.
        error: &'a HookError,
    },

    /// A test case started.
    TestStarted {
        /// The test case.
        id: TestCaseId<'a>,

        /// The resolved settings for the batch, or `None` if the test case was aborted before
        /// its settings could be resolved.
        config: Option<ExecutionConfig>,
    },

    /// A test case was ignored.
    ///
    /// This is either emitted on its own, for operations that are marked ignored or have an
    /// execution count of 0, or between start and finish if every invocation was skipped.
    TestIgnored {
        /// The test case.
        id: TestCaseId<'a>,
    },

    /// A test case failed.
    TestFailure {
        /// The test case.
        id: TestCaseId<'a>,

        /// The cause of the failure.
        cause: &'a (dyn error::Error + 'static),
    },

    /// A test case was aborted.
    TestAborted {
        /// The test case.
        id: TestCaseId<'a>,

        /// The cause of the abort.
        cause: &'a (dyn error::Error + 'static),
    },

    /// A test case finished.
    TestFinished {
        /// The test case.
        id: TestCaseId<'a>,

        /// The final status.
        status: TestStatus,

        /// How the individual invocations ended. `None` if the batch didn't complete.
        summary: Option<BatchSummary>,

        /// The time the batch took.
        elapsed: Duration,
    },

    /// The run was interrupted, and the remaining tests won't be started.
    RunInterrupted {
        /// The number of tests that won't be run.
        not_run: usize,
    },

    /// The test run finished.
    RunFinished {
        /// The time at which the run was started.
        start_time: SystemTime,

        /// The amount of time it took for the tests to run.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    colorize: bool,
}

impl TestReporterBuilder {
    /// Enables ANSI colors in the output.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Creates a new test reporter that writes to `writer`.
    pub fn build<W: Write>(&self, writer: W) -> TestReporter<W> {
        let mut styles = Styles::default();
        if self.colorize {
            styles.colorize();
        }
        TestReporter {
            writer,
            styles,
            in_progress: false,
            pending_cause: None,
        }
    }
}

/// Writes test events as aligned status lines.
#[derive(Debug)]
pub struct TestReporter<W> {
    writer: W,
    styles: Styles,
    // Set between TestStarted and TestFinished.
    in_progress: bool,
    // The cause of a failure or abort, written out after the status line.
    pending_cause: Option<String>,
}

impl<W: Write> TestReporter<W> {
    /// Reports a test event.
    pub fn report_event(&mut self, event: &TestEvent<'_>) -> io::Result<()> {
        match event {
            TestEvent::RunStarted { suite, test_count } => {
                writeln!(
                    self.writer,
                    "{:>12} {} {} in {}",
                    "Starting".style(self.styles.pass),
                    test_count.style(self.styles.count),
                    plural::tests_str(*test_count),
                    suite.style(self.styles.count),
                )?;
            }
            TestEvent::SuiteHookFailed { suite, error } => {
                writeln!(
                    self.writer,
                    "{:>12} {}: {}",
                    "HOOK FAIL".style(self.styles.fail),
                    suite.style(self.styles.count),
                    error,
                )?;
                let sources = format_sources(*error);
                self.writer.write_all(sources.as_bytes())?;
            }
            TestEvent::TestStarted { .. } => {
                self.in_progress = true;
            }
            TestEvent::TestIgnored { .. } if self.in_progress => {
                // Every invocation was skipped: TestFinished writes the status line.
            }
            TestEvent::TestIgnored { id } => {
                self.pending_cause = None;
                write!(self.writer, "{:>12} ", "SKIP".style(self.styles.skip))?;
                // same spacing [   0.034s]
                write!(self.writer, "[         ] ")?;
                writeln!(self.writer, "{}", id.style(self.styles.test_name))?;
            }
            TestEvent::TestFailure { cause, .. } | TestEvent::TestAborted { cause, .. } => {
                self.pending_cause = Some(format_cause(*cause));
            }
            TestEvent::TestFinished {
                id,
                status,
                summary,
                elapsed,
            } => {
                self.in_progress = false;
                let (label, style) = match status {
                    TestStatus::Passed => ("PASS", self.styles.pass),
                    TestStatus::Failed => ("FAIL", self.styles.fail),
                    TestStatus::Aborted => ("ABORT", self.styles.fail),
                    TestStatus::Ignored => ("SKIP", self.styles.skip),
                };
                write!(self.writer, "{:>12} ", label.style(style))?;
                self.write_duration(*elapsed)?;
                write!(self.writer, "{}", id.style(self.styles.test_name))?;
                if let Some(summary) = summary {
                    let summary = self.summary_str(summary);
                    write!(self.writer, " {summary}")?;
                }
                writeln!(self.writer)?;

                if let Some(cause) = self.pending_cause.take() {
                    write!(self.writer, "{}", cause.style(self.styles.fail_output))?;
                }
            }
            TestEvent::RunInterrupted { not_run } => {
                writeln!(
                    self.writer,
                    "{:>12} due to interrupt, {} {} not run",
                    "Canceling".style(self.styles.fail),
                    not_run.style(self.styles.count),
                    plural::tests_str(*not_run),
                )?;
            }
            TestEvent::RunFinished {
                elapsed, run_stats, ..
            } => {
                let summary_style = if run_stats.is_success() {
                    self.styles.pass
                } else {
                    self.styles.fail
                };
                write!(self.writer, "{:>12} ", "Summary".style(summary_style))?;
                self.write_duration(*elapsed)?;
                let run_stats = self.run_stats_str(run_stats);
                writeln!(self.writer, "{run_stats}")?;
            }
        }
        Ok(())
    }

    /// Consumes the reporter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_duration(&mut self, duration: Duration) -> io::Result<()> {
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        write!(self.writer, "[{:>8.3?}s] ", duration.as_secs_f64())
    }

    fn summary_str(&self, summary: &BatchSummary) -> String {
        let mut out = String::new();
        swrite!(
            out,
            "({}/{} {}",
            summary.successful.style(self.styles.count),
            summary.total.style(self.styles.count),
            "passed",
        );
        for (count, label) in [
            (summary.failed, "failed"),
            (summary.aborted, "aborted"),
            (summary.skipped, "skipped"),
        ] {
            if count > 0 {
                swrite!(out, ", {} {label}", count.style(self.styles.count));
            }
        }
        swrite!(out, ")");
        out
    }

    fn run_stats_str(&self, run_stats: &RunStats) -> String {
        let mut out = String::new();
        swrite!(out, "{}", run_stats.final_run_count.style(self.styles.count));
        if run_stats.final_run_count != run_stats.initial_run_count {
            swrite!(out, "/{}", run_stats.initial_run_count.style(self.styles.count));
        }
        swrite!(
            out,
            " {} run: {} {}",
            plural::tests_str(run_stats.initial_run_count),
            run_stats.passed.style(self.styles.count),
            "passed".style(self.styles.pass),
        );
        if run_stats.failed > 0 {
            swrite!(
                out,
                ", {} {}",
                run_stats.failed.style(self.styles.count),
                "failed".style(self.styles.fail),
            );
            if run_stats.timed_out > 0 {
                swrite!(
                    out,
                    " ({} timed out)",
                    run_stats.timed_out.style(self.styles.count),
                );
            }
        }
        if run_stats.aborted > 0 {
            swrite!(
                out,
                ", {} {}",
                run_stats.aborted.style(self.styles.count),
                "aborted".style(self.styles.fail),
            );
        }
        swrite!(
            out,
            ", {} {}",
            run_stats.ignored.style(self.styles.count),
            "ignored".style(self.styles.skip),
        );
        if run_stats.suite_hook_failures > 0 {
            swrite!(
                out,
                ", {} suite hook {}",
                run_stats.suite_hook_failures.style(self.styles.count),
                "failures".style(self.styles.fail),
            );
        }
        out
    }
}

// Formats the error and its source chain, one per line.
fn format_cause(cause: &(dyn error::Error + 'static)) -> String {
    let mut out = String::new();
    swriteln!(out, "    {cause}");
    out.push_str(&format_sources(cause));
    out
}

// Formats only the source chain of the error.
fn format_sources(error: &(dyn error::Error + 'static)) -> String {
    let mut out = String::new();
    let mut source = error.source();
    while let Some(error) = source {
        swriteln!(out, "      caused by: {error}");
        source = error.source();
    }
    out
}

#[derive(Clone, Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    test_name: Style,
    fail_output: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.test_name = Style::new().blue().bold();
        self.fail_output = Style::new().magenta();
    }
}
