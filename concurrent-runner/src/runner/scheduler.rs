// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{BatchResult, InvocationJob, ResultAggregator, TieBreak};
use crate::{
    config::ExecutionConfig,
    errors::{BatchInterrupted, ScheduleError, TimeoutExceeded},
    fixture::{Lifecycle, TestOperation},
    helpers::plural,
    signal::InterruptHandle,
    stopwatch::StopwatchStart,
};
use crossbeam_channel::{Receiver, select};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::ThreadPoolBuilder;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Runs a batch of invocations of one test operation on a bounded worker pool.
///
/// A scheduler is reused across test operations. Start delays are drawn from its random number
/// generator, so a scheduler created with [`with_seed`](Self::with_seed) produces the same delays
/// for the same sequence of batches.
#[derive(Debug)]
pub struct ExecutionScheduler {
    rng: StdRng,
    interrupt: Option<InterruptHandle>,
    tie_break: TieBreak,
}

impl ExecutionScheduler {
    /// Creates a new scheduler, seeded from the operating system.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Creates a new scheduler with a fixed seed for start delays.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            interrupt: None,
            tie_break: TieBreak::default(),
        }
    }

    /// Stops waiting for a batch as soon as `interrupt` is triggered.
    pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Sets the tie-break rule used when reducing outcomes.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Builds every job for a batch up front, drawing a start delay for each.
    ///
    /// Delays are whole milliseconds in `[0, max_random_delay)`.
    pub fn build_jobs<F>(
        &mut self,
        lifecycle: &Arc<Lifecycle<F>>,
        operation: &Arc<TestOperation<F>>,
        config: &ExecutionConfig,
    ) -> Vec<InvocationJob<F>> {
        let max_delay_ms = u64::try_from(config.max_random_delay().as_millis()).unwrap_or(u64::MAX);
        (0..config.execution_count())
            .map(|index| {
                let job = InvocationJob::new(index, lifecycle.clone(), operation.clone());
                if max_delay_ms == 0 {
                    job
                } else {
                    job.with_delay(Duration::from_millis(self.rng.random_range(0..max_delay_ms)))
                }
            })
            .collect()
    }

    /// Runs the configured number of invocations of `operation` and reduces them to one result.
    ///
    /// * An execution count of 0 runs nothing and produces an ignored result.
    /// * An execution count of 1 runs the invocation on the current thread. No pool is created
    ///   and the timeout doesn't apply.
    /// * Otherwise, invocations run on a pool of `min(workers, executions)` threads. If the
    ///   timeout elapses first, this returns [`ScheduleError::Timeout`]. Jobs that haven't
    ///   constructed their fixture yet are cancelled. Jobs already past that point are left to
    ///   finish on their own, and their outcomes are discarded.
    pub fn schedule<F: 'static>(
        &mut self,
        lifecycle: &Arc<Lifecycle<F>>,
        operation: &Arc<TestOperation<F>>,
        config: &ExecutionConfig,
    ) -> Result<BatchResult, ScheduleError> {
        match config.execution_count() {
            0 => {
                debug!("`{}` has an execution count of 0, not running", operation.name());
                Ok(BatchResult::ignored(0))
            }
            1 => {
                debug!("running `{}` once on the current thread", operation.name());
                let job = InvocationJob::new(0, lifecycle.clone(), operation.clone());
                let mut aggregator = self.aggregator(1);
                aggregator.observe(job.run());
                Ok(aggregator.finish())
            }
            _ => self.schedule_pool(lifecycle, operation, config),
        }
    }

    fn schedule_pool<F: 'static>(
        &mut self,
        lifecycle: &Arc<Lifecycle<F>>,
        operation: &Arc<TestOperation<F>>,
        config: &ExecutionConfig,
    ) -> Result<BatchResult, ScheduleError> {
        let total = config.execution_count();
        let jobs = self.build_jobs(lifecycle, operation, config);

        let pool_size = config.pool_size();
        let pool = ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name(|idx| format!("concurrent-runner-{idx}"))
            .build()
            .map_err(ScheduleError::PoolBuild)?;

        info!(
            "running `{}`: {total} {} on {pool_size} {}",
            operation.name(),
            plural::jobs_str(total),
            plural::workers_str(pool_size),
        );

        // Wakes up delaying jobs, and keeps queued jobs from starting, once the batch has been
        // given up on.
        let batch_cancel = InterruptHandle::new();
        let (run_sender, run_receiver) = crossbeam_channel::unbounded();

        for job in jobs {
            let run_sender = run_sender.clone();
            let batch_cancel = batch_cancel.clone();
            pool.spawn(move || {
                if batch_cancel.is_interrupted() {
                    debug!(job = job.index(), "batch was cancelled, not starting");
                    return;
                }
                let index = job.index();
                let outcome = job.with_interrupt(batch_cancel).run();
                // The receiver is gone if the scheduler stopped waiting.
                _ = run_sender.send((index, outcome));
            });
        }
        // Drop the original sender so that the receiver disconnects once every job is done.
        drop(run_sender);

        let stopwatch = StopwatchStart::now();
        let timeout = config.timeout();
        let timeout_receiver = match timeout.and_then(|timeout| stopwatch.deadline(timeout)) {
            Some(deadline) => crossbeam_channel::at(deadline),
            None => crossbeam_channel::never(),
        };
        let interrupt_receiver: Receiver<Infallible> = match &self.interrupt {
            Some(interrupt) => interrupt.receiver(),
            None => crossbeam_channel::never(),
        };

        let mut aggregator = self.aggregator(total);
        let mut completed = 0;
        loop {
            select! {
                recv(run_receiver) -> message => {
                    let Ok((index, outcome)) = message else {
                        // All senders dropped: every job has finished.
                        break;
                    };
                    completed += 1;
                    debug!(job = index, "finished ({completed}/{total})");
                    aggregator.observe(outcome);
                }
                recv(timeout_receiver) -> _ => {
                    let timeout = timeout.unwrap_or_default();
                    warn!(
                        "`{}` exceeded timeout of {}: {completed}/{total} {} finished",
                        operation.name(),
                        humantime::format_duration(timeout),
                        plural::jobs_str(total),
                    );
                    batch_cancel.interrupt();
                    return Err(TimeoutExceeded::new(timeout, completed, total).into());
                }
                recv(interrupt_receiver) -> _ => {
                    warn!(
                        "interrupted while running `{}`: {completed}/{total} {} finished",
                        operation.name(),
                        plural::jobs_str(total),
                    );
                    batch_cancel.interrupt();
                    return Err(BatchInterrupted::new(completed, total).into());
                }
            }
        }

        let elapsed = stopwatch.end().duration;
        let result = aggregator.finish();
        debug!(
            "`{}` finished in {:.3?}s: {}",
            operation.name(),
            elapsed.as_secs_f64(),
            result.outcome,
        );
        // The pool is dropped here. Its threads exit once their queues are empty.
        Ok(result)
    }

    fn aggregator(&self, total: usize) -> ResultAggregator {
        ResultAggregator::new(total).with_tie_break(self.tie_break)
    }
}

impl Default for ExecutionScheduler {
    fn default() -> Self {
        Self::new()
    }
}
