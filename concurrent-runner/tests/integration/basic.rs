// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::tempdir;
use concurrent_runner::{
    config::{ConcurrentSettings, RunnerConfig},
    fixture::{Lifecycle, TestOperation, TestSuite},
    runner::{ConcurrentRunnerBuilder, TestStatus},
    signal::InterruptHandle,
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
    time::{Duration, Instant},
};
use test_case::test_case;

#[derive(Default)]
struct Shared {
    invocations: AtomicUsize,
    threads: Mutex<HashSet<ThreadId>>,
    starts: Mutex<Vec<Instant>>,
}

impl Shared {
    fn record(&self) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().insert(thread::current().id());
        self.starts.lock().unwrap().push(Instant::now());
    }

    fn start_spread(&self) -> Duration {
        let starts = self.starts.lock().unwrap();
        let first = starts.iter().min().copied().unwrap();
        let last = starts.iter().max().copied().unwrap();
        last - first
    }
}

fn recording_suite(shared: &Arc<Shared>, settings: ConcurrentSettings) -> TestSuite<()> {
    let shared = shared.clone();
    TestSuite::new("recording", Lifecycle::from_default()).test(
        TestOperation::new("record", move |_: &mut ()| {
            shared.record();
            Ok(())
        })
        .concurrent(settings),
    )
}

#[test]
fn fifty_executions_on_ten_workers() {
    let shared = Arc::new(Shared::default());
    let suite = recording_suite(
        &shared,
        ConcurrentSettings::new()
            .executions(50)
            .workers(10)
            .random_delay(Duration::from_millis(500)),
    );

    let run = run_suite(&suite);

    assert!(run.run_stats.is_success(), "run succeeded: {}", run.output);
    assert_eq!(shared.invocations.load(Ordering::SeqCst), 50);
    assert_eq!(shared.threads.lock().unwrap().len(), 10);
    // Staggering spreads starts out, rather than releasing every invocation at once.
    assert!(
        shared.start_spread() >= Duration::from_millis(25),
        "start spread {:?} is at least 25ms",
        shared.start_spread(),
    );
    assert_eq!(
        run.events,
        [
            Recorded::RunStarted(1),
            Recorded::Started("record".to_owned()),
            Recorded::Finished("record".to_owned(), TestStatus::Passed),
            Recorded::RunFinished,
        ]
    );
}

#[test]
fn staggering_spreads_starts_within_max_delay() {
    const MAX_DELAY: Duration = Duration::from_millis(200);

    let mut spreads = Vec::new();
    for seed in 1..=5 {
        // As many workers as executions, so no invocation waits in the queue.
        let shared = Arc::new(Shared::default());
        let suite = recording_suite(
            &shared,
            ConcurrentSettings::new()
                .executions(8)
                .workers(8)
                .random_delay(MAX_DELAY),
        );
        let mut builder = ConcurrentRunnerBuilder::default();
        builder.set_seed(seed);

        let run = run_suite_with(&RunnerConfig::default(), &builder, &suite);

        assert!(run.run_stats.is_success(), "seed {seed}: {}", run.output);
        let spread = shared.start_spread();
        assert!(
            spread > MAX_DELAY / 20,
            "seed {seed}: spread {spread:?} is more than 5% of {MAX_DELAY:?}"
        );
        // Delays are below the maximum. Allow for thread startup.
        assert!(
            spread < MAX_DELAY + Duration::from_millis(25),
            "seed {seed}: spread {spread:?} is bounded by {MAX_DELAY:?}"
        );
        spreads.push(spread);
    }

    let mean = spreads.iter().sum::<Duration>() / spreads.len() as u32;
    assert!(
        mean < MAX_DELAY * 19 / 20,
        "mean spread {mean:?} across {spreads:?} is less than 95% of {MAX_DELAY:?}"
    );
}

#[test_case(1, 8 ; "one worker")]
#[test_case(4, 8 ; "fewer workers than executions")]
#[test_case(16, 8 ; "more workers than executions")]
fn pool_is_bounded(workers: usize, executions: usize) {
    let shared = Arc::new(Shared::default());
    let suite = recording_suite(
        &shared,
        ConcurrentSettings::new()
            .executions(executions)
            .workers(workers),
    );

    let run = run_suite(&suite);

    assert!(run.run_stats.is_success());
    assert_eq!(shared.invocations.load(Ordering::SeqCst), executions);
    assert!(shared.threads.lock().unwrap().len() <= workers.min(executions));
}

#[test]
fn zero_executions_is_ignored_without_running() {
    let shared = Arc::new(Shared::default());
    let suite = recording_suite(&shared, ConcurrentSettings::new().executions(0));

    let run = run_suite(&suite);

    assert_eq!(shared.invocations.load(Ordering::SeqCst), 0);
    assert_eq!(run.events_for("record"), [&Recorded::Ignored("record".to_owned())]);
    assert_eq!(run.run_stats.ignored, 1);
    assert!(run.run_stats.is_success());
}

#[test]
fn single_execution_runs_on_calling_thread() {
    let shared = Arc::new(Shared::default());
    let suite = recording_suite(&shared, ConcurrentSettings::new().executions(1).workers(4));

    run_suite(&suite);

    let threads = shared.threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert!(threads.contains(&thread::current().id()));
}

#[test]
fn plain_operation_runs_once() {
    let shared = Arc::new(Shared::default());
    let recorder = shared.clone();
    let suite = TestSuite::new("plain", Lifecycle::<()>::from_default()).test(
        TestOperation::new("once", move |_| {
            recorder.record();
            Ok(())
        }),
    );

    let run = run_suite(&suite);

    assert_eq!(shared.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(run.run_stats.passed, 1);
}

#[test]
fn timeout_fails_without_waiting_for_stragglers() {
    let suite = TestSuite::new("slow", Lifecycle::<()>::from_default())
        .test(
            TestOperation::new("sleeps", |_| {
                thread::sleep(Duration::from_secs(3));
                Ok(())
            })
            .concurrent(
                ConcurrentSettings::new()
                    .executions(4)
                    .workers(2)
                    .timeout(Duration::from_millis(100)),
            ),
        )
        .test(TestOperation::new("after", |_| Ok(())));

    let start = Instant::now();
    let run = run_suite(&suite);
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(2),
        "runner returned in {elapsed:?}, without waiting for in-flight jobs"
    );
    let events = run.events_for("sleeps");
    assert_eq!(events.len(), 3, "started, failure, finished: {events:?}");
    match events[1] {
        Recorded::Failure(_, cause) => assert!(
            cause.starts_with(
                "concurrent test invocations took longer than desired timeout (100ms)"
            ),
            "cause is a timeout: {cause}"
        ),
        other => panic!("expected failure, found {other:?}"),
    }
    assert_eq!(
        events[2],
        &Recorded::Finished("sleeps".to_owned(), TestStatus::Failed)
    );
    assert_eq!(run.run_stats.timed_out, 1);
    // The next test still runs.
    assert_eq!(run.run_stats.passed, 1);
}

#[test]
fn interrupt_aborts_batch_and_stops_run() {
    let suite = TestSuite::new("interruptible", Lifecycle::<()>::from_default())
        .test(
            TestOperation::new("delayed", |_| Ok(())).concurrent(
                ConcurrentSettings::new()
                    .executions(6)
                    .workers(3)
                    .random_delay(Duration::from_secs(30)),
            ),
        )
        .test(TestOperation::new("never-started", |_| Ok(())));

    let interrupt = InterruptHandle::new();
    let trigger = interrupt.clone();
    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.interrupt();
    });

    let config = RunnerConfig::default();
    let mut builder = ConcurrentRunnerBuilder::default();
    builder.set_seed(1).set_interrupt(interrupt);
    let start = Instant::now();
    let run = run_suite_with(&config, &builder, &suite);
    interrupter.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    match run.events_for("delayed")[1] {
        Recorded::Aborted(_, cause) => assert!(
            cause.starts_with("interrupted while waiting for concurrent test invocations"),
            "cause is an interrupt: {cause}"
        ),
        other => panic!("expected abort, found {other:?}"),
    }
    assert!(run.events_for("never-started").is_empty());
    assert!(run.events.contains(&Recorded::Interrupted(1)));
    assert_eq!(run.run_stats.aborted, 1);
    assert!(!run.run_stats.is_success());
}

#[test]
fn profile_supplies_unset_settings() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("concurrent-runner.toml");
    std::fs::write(
        &config_path,
        indoc! {r#"
            [profile.default]
            worker-count = 3
            execution-count = 12
        "#},
    )
    .unwrap();
    let config = RunnerConfig::from_sources(Some(config_path.as_path()), dir.path()).unwrap();

    let shared = Arc::new(Shared::default());
    let suite = recording_suite(&shared, ConcurrentSettings::new());
    let mut builder = ConcurrentRunnerBuilder::default();
    builder.set_seed(2);
    let run = run_suite_with(&config, &builder, &suite);

    assert!(run.run_stats.is_success());
    assert_eq!(shared.invocations.load(Ordering::SeqCst), 12);
    assert!(shared.threads.lock().unwrap().len() <= 3);
}

#[test]
fn zero_workers_is_reported_as_aborted() {
    let shared = Arc::new(Shared::default());
    let suite = recording_suite(&shared, ConcurrentSettings::new().workers(0));

    let run = run_suite(&suite);

    assert_eq!(shared.invocations.load(Ordering::SeqCst), 0);
    assert_eq!(
        run.events_for("record"),
        [
            &Recorded::Started("record".to_owned()),
            &Recorded::Aborted("record".to_owned(), "worker count may not be 0".to_owned()),
            &Recorded::Finished("record".to_owned(), TestStatus::Aborted),
        ]
    );
}
