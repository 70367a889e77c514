// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Marshaling event delivery onto a thread's dispatch queue.
//!
//! A [`DispatchQueue`] is a consumer loop owned by one thread. Entering it with
//! [`DispatchQueue::enter`] makes it the current dispatch context of that thread. When event
//! marshaling is enabled, an executor captures the current context as the run starts and funnels
//! every lifecycle event through it, so loggers observe events on the thread that started the run
//! even when tests execute on worker threads.
//!
//! Marshaled delivery is blocking: the raising thread waits until the owner thread runs the event,
//! typically through [`DispatchQueue::join`] or [`DispatchQueue::pump`].

use crate::{
    errors::{DispatchError, ExecuteError},
    runner::RunHandle,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::{
    cell::RefCell,
    fmt,
    marker::PhantomData,
    thread::{self, ThreadId},
    time::Duration,
};
use unitrun_metadata::RunStats;

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
    static CURRENT: RefCell<Option<Dispatcher>> = const { RefCell::new(None) };
}

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// A handle for sending work to a [`DispatchQueue`].
#[derive(Clone)]
pub struct Dispatcher {
    sender: Sender<Job>,
    owner: ThreadId,
}

impl Dispatcher {
    /// Returns the dispatcher installed on the current thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Returns true if called on the thread owning the queue.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Runs `f` on the queue's owner thread and returns its result.
    ///
    /// Runs inline if already on the owner thread. Otherwise blocks until the owner thread pumps
    /// the queue.
    pub fn invoke<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            return Ok(f());
        }

        let (reply_sender, reply_receiver) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            // The caller only goes away if it panicked.
            _ = reply_sender.send(f());
        });
        self.sender
            .send(job)
            .map_err(|_| DispatchError::Disconnected)?;
        reply_receiver
            .recv()
            .map_err(|_| DispatchError::Disconnected)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// How an executor delivers lifecycle events.
#[derive(Clone, Debug)]
pub enum DispatchPolicy {
    /// Deliver on whichever thread raises the event.
    Immediate,

    /// Deliver on the thread owning the dispatcher.
    Marshaled(Dispatcher),
}

impl DispatchPolicy {
    /// Determines the policy for a run starting on this thread.
    pub(crate) fn capture(marshal: bool) -> Result<Self, DispatchError> {
        if !marshal {
            return Ok(Self::Immediate);
        }
        Dispatcher::current()
            .map(Self::Marshaled)
            .ok_or(DispatchError::NoContext)
    }
}

/// A queue of work to be run on the thread that created it.
pub struct DispatchQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    owner: ThreadId,
    // Pinned to the creating thread.
    _not_send: PhantomData<*const ()>,
}

impl DispatchQueue {
    /// Creates a queue owned by the current thread.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            owner: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// Returns a dispatcher for this queue.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            sender: self.sender.clone(),
            owner: self.owner,
        }
    }

    /// Installs this queue as the current thread's dispatch context until the guard is dropped.
    pub fn enter(&self) -> DispatchGuard<'_> {
        let previous = CURRENT.with(|current| current.replace(Some(self.dispatcher())));
        DispatchGuard {
            previous,
            _queue: PhantomData,
        }
    }

    /// Runs all pending work without blocking. Returns the number of items run.
    pub fn pump(&self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Waits up to `timeout` for work, then runs everything pending. Returns the number of items
    /// run.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pumps this queue until the run behind `handle` finishes, then returns its result.
    pub fn join(&self, handle: RunHandle) -> Result<RunStats, ExecuteError> {
        while !handle.is_finished() {
            self.pump_timeout(PUMP_INTERVAL);
        }
        self.pump();
        handle.join()
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("owner", &self.owner)
            .field("pending", &self.receiver.len())
            .finish()
    }
}

/// Restores the previous dispatch context when dropped.
#[must_use = "the dispatch context is uninstalled when the guard is dropped"]
pub struct DispatchGuard<'a> {
    previous: Option<Dispatcher>,
    _queue: PhantomData<&'a DispatchQueue>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

impl fmt::Debug for DispatchGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchGuard").finish_non_exhaustive()
    }
}
