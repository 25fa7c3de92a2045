// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use concurrent_runner::{
    config::RunnerConfig,
    fixture::TestSuite,
    reporter::{TestEvent, TestReporterBuilder},
    runner::{ConcurrentRunnerBuilder, RunStats, TestStatus},
};
use std::sync::Once;

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Another test binary in the same process may have installed a subscriber already.
        _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// An owned copy of a [`TestEvent`], for comparing against expectations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Recorded {
    RunStarted(usize),
    SuiteHookFailed(String),
    Started(String),
    Ignored(String),
    Failure(String, String),
    Aborted(String, String),
    Finished(String, TestStatus),
    Interrupted(usize),
    RunFinished,
}

impl Recorded {
    fn from_event(event: &TestEvent<'_>) -> Self {
        match event {
            TestEvent::RunStarted { test_count, .. } => Self::RunStarted(*test_count),
            TestEvent::SuiteHookFailed { error, .. } => Self::SuiteHookFailed(error.to_string()),
            TestEvent::TestStarted { id, .. } => Self::Started(id.name.to_owned()),
            TestEvent::TestIgnored { id } => Self::Ignored(id.name.to_owned()),
            TestEvent::TestFailure { id, cause } => {
                Self::Failure(id.name.to_owned(), cause.to_string())
            }
            TestEvent::TestAborted { id, cause } => {
                Self::Aborted(id.name.to_owned(), cause.to_string())
            }
            TestEvent::TestFinished { id, status, .. } => {
                Self::Finished(id.name.to_owned(), *status)
            }
            TestEvent::RunInterrupted { not_run } => Self::Interrupted(*not_run),
            TestEvent::RunFinished { .. } => Self::RunFinished,
        }
    }
}

pub(crate) struct SuiteRun {
    pub(crate) events: Vec<Recorded>,
    pub(crate) run_stats: RunStats,
    pub(crate) output: String,
}

impl SuiteRun {
    /// Returns the events for one test, in order.
    pub(crate) fn events_for(&self, name: &str) -> Vec<&Recorded> {
        self.events
            .iter()
            .filter(|event| match event {
                Recorded::Started(n)
                | Recorded::Ignored(n)
                | Recorded::Failure(n, _)
                | Recorded::Aborted(n, _)
                | Recorded::Finished(n, _) => n == name,
                _ => false,
            })
            .collect()
    }
}

pub(crate) fn run_suite<F: 'static>(suite: &TestSuite<F>) -> SuiteRun {
    let config = RunnerConfig::default();
    let mut builder = ConcurrentRunnerBuilder::default();
    builder.set_seed(0x5eed);
    run_suite_with(&config, &builder, suite)
}

pub(crate) fn run_suite_with<F: 'static>(
    config: &RunnerConfig,
    builder: &ConcurrentRunnerBuilder,
    suite: &TestSuite<F>,
) -> SuiteRun {
    test_init();

    let profile = config.profile(None).expect("default profile exists");
    let mut runner = builder.build(profile);
    let mut reporter = TestReporterBuilder::default().build(Vec::new());
    let mut events = Vec::new();
    let run_stats = runner.execute(suite, |event| {
        reporter
            .report_event(&event)
            .expect("writing to a Vec succeeds");
        events.push(Recorded::from_event(&event));
    });

    SuiteRun {
        events,
        run_stats,
        output: String::from_utf8(reporter.into_inner()).expect("output is valid UTF-8"),
    }
}
