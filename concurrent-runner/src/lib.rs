// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Run a single logical test case many times concurrently, then collapse the outcomes into one
//! reportable result.
//!
//! The basic flow is:
//!
//! 1. A [`TestSuite`](fixture::TestSuite) describes a fixture type: how to construct it, which
//!    setup and teardown hooks to run around each test, and the test operations themselves.
//! 2. [`ConcurrentRunner`](runner::ConcurrentRunner) walks the suite. For every operation it
//!    resolves an [`ExecutionConfig`](config::ExecutionConfig) and hands the operation to an
//!    [`ExecutionScheduler`](runner::ExecutionScheduler).
//! 3. The scheduler builds one [`InvocationJob`](runner::InvocationJob) per execution, runs them
//!    on a bounded worker pool, and waits for them (optionally with a timeout).
//! 4. Each job produces at most one [`Outcome`](outcome::Outcome), and the
//!    [`ResultAggregator`](runner::ResultAggregator) reduces them by priority: aborted beats
//!    failed beats successful.
//! 5. The result is reported through [`TestEvent`](reporter::TestEvent)s, one start/finish pair
//!    per test case.

pub mod config;
pub mod errors;
pub mod fixture;
mod helpers;
pub mod outcome;
pub mod reporter;
pub mod runner;
pub mod signal;
mod stopwatch;
