// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use concurrent_runner::{
    config::ConcurrentSettings,
    errors::BoxError,
    fixture::{ExpectedError, Lifecycle, Skip, TestOperation, TestSuite, assume},
    runner::TestStatus,
};
use pretty_assertions::assert_eq;
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

fn settings(executions: usize) -> ConcurrentSettings {
    ConcurrentSettings::new().executions(executions).workers(4)
}

/// A fixture that knows which invocation it belongs to.
struct Numbered {
    number: usize,
}

fn numbered_lifecycle(constructed: &Arc<AtomicUsize>) -> Lifecycle<Numbered> {
    let constructed = constructed.clone();
    Lifecycle::new(move || {
        Ok(Numbered {
            number: constructed.fetch_add(1, Ordering::SeqCst),
        })
    })
}

#[test]
fn one_failure_among_successes_fails_the_test() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let suite = TestSuite::new("priority", numbered_lifecycle(&constructed)).test(
        TestOperation::new("fails-once", |fixture: &mut Numbered| {
            if fixture.number == 3 {
                Err("invocation 3 observed a torn write".into())
            } else {
                Ok(())
            }
        })
        .concurrent(settings(10)),
    );

    let run = run_suite(&suite);

    assert_eq!(
        run.events_for("fails-once"),
        [
            &Recorded::Started("fails-once".to_owned()),
            &Recorded::Failure(
                "fails-once".to_owned(),
                "invocation 3 observed a torn write".to_owned()
            ),
            &Recorded::Finished("fails-once".to_owned(), TestStatus::Failed),
        ]
    );
    assert_eq!(run.run_stats.failed, 1);
}

#[test]
fn abort_outranks_failure() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let lifecycle = Lifecycle::new(move || {
        let number = counter.fetch_add(1, Ordering::SeqCst);
        if number == 5 {
            Err(BoxError::from("connection pool exhausted"))
        } else {
            Ok(Numbered { number })
        }
    });
    let suite = TestSuite::new("priority", lifecycle).test(
        TestOperation::new("always-fails", |fixture: &mut Numbered| {
            Err(format!("invocation {} failed", fixture.number).into())
        })
        .concurrent(settings(8)),
    );

    let run = run_suite(&suite);

    let events = run.events_for("always-fails");
    assert_eq!(
        events[1],
        &Recorded::Aborted(
            "always-fails".to_owned(),
            "failed to construct test fixture".to_owned()
        )
    );
    assert_eq!(run.run_stats.aborted, 1);
    assert!(run.output.contains("caused by: connection pool exhausted"));
}

#[test]
fn all_skipped_is_ignored_between_start_and_finish() {
    let suite = TestSuite::new("skips", Lifecycle::<()>::from_default()).test(
        TestOperation::new("needs-gpu", |_| {
            assume(false, "no gpu available")?;
            Ok(())
        })
        .concurrent(settings(6)),
    );

    let run = run_suite(&suite);

    assert_eq!(
        run.events_for("needs-gpu"),
        [
            &Recorded::Started("needs-gpu".to_owned()),
            &Recorded::Ignored("needs-gpu".to_owned()),
            &Recorded::Finished("needs-gpu".to_owned(), TestStatus::Ignored),
        ]
    );
    assert!(run.run_stats.is_success());
}

#[test]
fn each_test_case_gets_one_status_line() {
    let suite = TestSuite::new("skips", Lifecycle::<()>::from_default())
        .test(
            TestOperation::new("needs-gpu", |_| {
                assume(false, "no gpu available")?;
                Ok(())
            })
            .concurrent(settings(3)),
        )
        .test(TestOperation::new("not-yet", |_| Ok(())).ignore())
        .test(TestOperation::new("passes", |_| Ok(())).concurrent(settings(3)));

    let run = run_suite(&suite);

    for name in ["needs-gpu", "not-yet", "passes"] {
        let test_name = format!("skips::{name}");
        let lines: Vec<_> = run
            .output
            .lines()
            .filter(|line| line.contains(&test_name))
            .collect();
        assert_eq!(lines.len(), 1, "one line for {name}: {lines:?}");
    }
    assert!(
        run.output.contains("skips::needs-gpu (0/3 passed, 3 skipped)"),
        "{}",
        run.output
    );
}

#[test]
fn skipped_invocations_do_not_hide_success() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let suite = TestSuite::new("skips", numbered_lifecycle(&constructed)).test(
        TestOperation::new("skips-odd", |fixture: &mut Numbered| {
            if fixture.number % 2 == 1 {
                std::panic::panic_any(Skip::new("odd invocation"));
            }
            Ok(())
        })
        .concurrent(settings(10)),
    );

    let run = run_suite(&suite);

    assert_eq!(run.run_stats.passed, 1);
    assert!(run.output.contains("(5/10 passed, 5 skipped)"), "{}", run.output);
}

#[test]
fn after_hooks_run_for_every_constructed_fixture() {
    let after_runs = Arc::new(AtomicUsize::new(0));
    let counter = after_runs.clone();
    let lifecycle = Lifecycle::<()>::from_default()
        .before("flaky-setup", |_| Err("setup failed".into()))
        .after("teardown", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    let suite = TestSuite::new("hooks", lifecycle).test(
        TestOperation::new("unreachable-body", |_| panic!("body must not run"))
            .concurrent(settings(7)),
    );

    let run = run_suite(&suite);

    assert_eq!(after_runs.load(Ordering::SeqCst), 7);
    assert_eq!(
        run.events_for("unreachable-body")[1],
        &Recorded::Failure(
            "unreachable-body".to_owned(),
            "before hook `flaky-setup` failed".to_owned()
        )
    );
}

#[test]
fn after_hooks_run_despite_failing_bodies() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let after_runs = Arc::new(AtomicUsize::new(0));
    let counter = after_runs.clone();
    let lifecycle = numbered_lifecycle(&constructed).after("count", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let suite = TestSuite::new("hooks", lifecycle).test(
        TestOperation::new("always-fails", |fixture: &mut Numbered| {
            if fixture.number % 2 == 0 {
                Err(format!("invocation {} failed", fixture.number).into())
            } else {
                panic!("invocation {} panicked", fixture.number)
            }
        })
        .concurrent(settings(12)),
    );

    let run = run_suite(&suite);

    assert_eq!(after_runs.load(Ordering::SeqCst), 12);
    assert_eq!(run.run_stats.failed, 1);
    assert!(run.output.contains("(0/12 passed, 12 failed)"), "{}", run.output);
}

#[test]
fn expected_error_passes_and_missing_error_fails() {
    let suite = TestSuite::new("expected", Lifecycle::<()>::from_default())
        .test(
            TestOperation::new("returns-io-error", |_| {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out").into())
            })
            .expect_error(ExpectedError::of::<io::Error>())
            .concurrent(settings(5)),
        )
        .test(
            TestOperation::new("returns-ok", |_| Ok(()))
                .expect_error(ExpectedError::panic())
                .concurrent(settings(5)),
        );

    let run = run_suite(&suite);

    assert_eq!(
        run.events_for("returns-io-error").last(),
        Some(&&Recorded::Finished(
            "returns-io-error".to_owned(),
            TestStatus::Passed
        ))
    );
    assert_eq!(
        run.events_for("returns-ok")[1],
        &Recorded::Failure("returns-ok".to_owned(), "expected error: panic".to_owned())
    );
}

#[test]
fn ignored_operation_emits_only_ignored() {
    let suite = TestSuite::new("ignored", Lifecycle::<()>::from_default())
        .test(TestOperation::new("not-yet", |_| panic!("must not run")).ignore());

    let run = run_suite(&suite);

    assert_eq!(
        run.events_for("not-yet"),
        [&Recorded::Ignored("not-yet".to_owned())]
    );
}

#[test]
fn before_all_failure_aborts_every_test() {
    let after_all_runs = Arc::new(AtomicUsize::new(0));
    let counter = after_all_runs.clone();
    let suite = TestSuite::new("suite-hooks", Lifecycle::<()>::from_default())
        .before_all("start-server", || Err("address in use".into()))
        .after_all("stop-server", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .test(TestOperation::new("first", |_| Ok(())).concurrent(settings(3)))
        .test(TestOperation::new("second", |_| Ok(())));

    let run = run_suite(&suite);

    assert_eq!(after_all_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        run.events[1],
        Recorded::SuiteHookFailed("before-all hook `start-server` failed".to_owned())
    );
    for name in ["first", "second"] {
        assert_eq!(
            run.events_for(name)[2],
            &Recorded::Finished(name.to_owned(), TestStatus::Aborted)
        );
    }
    assert_eq!(run.run_stats.aborted, 2);
    assert_eq!(run.run_stats.suite_hook_failures, 1);
}

#[test]
fn after_all_failure_fails_the_run() {
    let suite = TestSuite::new("suite-hooks", Lifecycle::<()>::from_default())
        .after_all("cleanup", || Err("files still open".into()))
        .test(TestOperation::new("passes", |_| Ok(())));

    let run = run_suite(&suite);

    assert_eq!(run.run_stats.passed, 1);
    assert_eq!(run.run_stats.suite_hook_failures, 1);
    assert!(!run.run_stats.is_success());
    assert_eq!(
        run.events[run.events.len() - 2],
        Recorded::SuiteHookFailed("after-all hook `cleanup` failed".to_owned())
    );
}
