// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The concurrent invocation engine.
//!
//! * [`InvocationJob`] runs one invocation through the fixture lifecycle.
//! * [`ExecutionScheduler`] runs a batch of jobs on a worker pool and waits for them.
//! * [`ResultAggregator`] reduces a batch to a single [`FinalOutcome`].
//! * [`ConcurrentRunner`] walks a [`TestSuite`](crate::fixture::TestSuite) and reports
//!   [`TestEvent`](crate::reporter::TestEvent)s.

mod aggregator;
mod imp;
mod job;
mod scheduler;

pub use aggregator::*;
pub use imp::*;
pub use job::*;
pub use scheduler::*;
