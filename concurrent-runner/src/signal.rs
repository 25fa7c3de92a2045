// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative interruption of batches and jobs.
//!
//! Threads can't be interrupted preemptively, so interruption is modeled as a broadcast: an
//! [`InterruptHandle`] owns the only sender of a channel, and interrupting drops it. Every
//! receiver then observes a disconnection, which wakes any thread blocked in `select!` or
//! `recv_timeout` on that receiver.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::{
    convert::Infallible,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// A cloneable handle used to interrupt a batch.
///
/// The host passes an `InterruptHandle` to
/// [`ExecutionScheduler::with_interrupt`](crate::runner::ExecutionScheduler::with_interrupt)
/// and calls [`interrupt`](Self::interrupt) from any thread to abort the batch currently being
/// waited on.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    inner: Arc<InterruptInner>,
}

#[derive(Debug)]
struct InterruptInner {
    interrupted: AtomicBool,
    // Never sends anything: it is only ever dropped.
    sender: Mutex<Option<Sender<Infallible>>>,
    receiver: Receiver<Infallible>,
}

impl InterruptHandle {
    /// Creates a new handle that hasn't been interrupted.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(InterruptInner {
                interrupted: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Interrupts every waiter on this handle. Calling this more than once has no further effect.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::Release);
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
    }

    /// Returns true if [`interrupt`](Self::interrupt) has been called.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Returns a receiver that becomes disconnected when this handle is interrupted.
    ///
    /// Intended for use with `crossbeam_channel::select!`.
    pub fn receiver(&self) -> Receiver<Infallible> {
        self.inner.receiver.clone()
    }

    /// Sleeps for `duration`, returning early with [`Interrupted`] if this handle is interrupted.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        match self.inner.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(Interrupted),
            Ok(never) => match never {},
        }
    }
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker returned when a wait was cut short by an interrupt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Interrupted;
