// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{EventBus, EventKind, SubscriptionId, TestEvent, TestEventKind};
use crate::{errors::HookError, list::TestDescriptor, runner::TestExecutor};
use std::{
    fmt, mem,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use unitrun_metadata::{RunSummary, SkipReason, TestOutcome};

/// Receives lifecycle events.
///
/// Every hook defaults to doing nothing. A hook may return a
/// [`LoggerError`](crate::errors::LoggerError), which is reported unchanged, or any other error,
/// which is wrapped into a `LoggerError` naming the logger type and the event. Panics are treated
/// like errors. The first error cancels the rest of the run.
///
/// `name` is the test name to display, already resolved against
/// [`LoggerHandle::use_fully_qualified_names`].
pub trait Logger: Send + 'static {
    /// A run started with `total` tests.
    fn on_test_run_started(&mut self, total: usize) -> Result<(), HookError> {
        _ = total;
        Ok(())
    }

    /// A test started.
    fn on_test_started(&mut self, name: &str, test: &TestDescriptor) -> Result<(), HookError> {
        _ = (name, test);
        Ok(())
    }

    /// A test ran to an outcome other than skipped.
    fn on_test_completed(
        &mut self,
        name: &str,
        test: &TestDescriptor,
        outcome: &TestOutcome,
        time_taken: Duration,
    ) -> Result<(), HookError> {
        _ = (name, test, outcome, time_taken);
        Ok(())
    }

    /// A test was skipped.
    fn on_test_skipped(
        &mut self,
        name: &str,
        test: &TestDescriptor,
        reason: &SkipReason,
    ) -> Result<(), HookError> {
        _ = (name, test, reason);
        Ok(())
    }

    /// The run finished.
    fn on_test_run_completed(&mut self, summary: &RunSummary) -> Result<(), HookError> {
        _ = summary;
        Ok(())
    }
}

/// A logger attached to an event bus.
///
/// Cloning the handle shares the logger. The logger stays subscribed until [`close`](Self::close)
/// is called or the last handle is dropped.
pub struct LoggerHandle<L> {
    inner: Arc<LoggerInner<L>>,
}

struct LoggerInner<L> {
    logger: Mutex<L>,
    bus: Arc<EventBus>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    use_fully_qualified_names: AtomicBool,
}

impl<L: Logger> LoggerHandle<L> {
    /// Subscribes `logger` to all five lifecycle events of `executor`.
    pub fn attach(executor: &TestExecutor, logger: L) -> Self {
        Self::attach_to_bus(executor.events(), logger)
    }

    /// Subscribes `logger` to all five lifecycle events of `bus`.
    pub fn attach_to_bus(bus: &Arc<EventBus>, logger: L) -> Self {
        let inner = Arc::new(LoggerInner {
            logger: Mutex::new(logger),
            bus: bus.clone(),
            subscriptions: Mutex::new(Vec::new()),
            use_fully_qualified_names: AtomicBool::new(false),
        });

        let owner = std::any::type_name::<L>();
        let ids: Vec<_> = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let weak = Arc::downgrade(&inner);
                bus.subscribe_as(kind, owner, move |event| dispatch(&weak, event))
            })
            .collect();
        *inner.subscriptions_lock() = ids;

        Self { inner }
    }

    /// Runs `f` with exclusive access to the logger.
    pub fn with_logger<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        let mut logger = self.inner.logger.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut logger)
    }
}

impl<L> LoggerHandle<L> {
    /// Unsubscribes the logger from all events. Calling this more than once has no further effect.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns true if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.subscriptions_lock().is_empty()
    }

    /// Whether hooks receive fully-qualified test names. Defaults to false.
    pub fn use_fully_qualified_names(&self) -> bool {
        self.inner.use_fully_qualified_names.load(Ordering::Relaxed)
    }

    /// Sets whether hooks receive fully-qualified test names.
    pub fn set_use_fully_qualified_names(&self, value: bool) {
        self.inner
            .use_fully_qualified_names
            .store(value, Ordering::Relaxed);
    }
}

impl<L> Clone for LoggerHandle<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L> fmt::Debug for LoggerHandle<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerHandle")
            .field("logger_type", &std::any::type_name::<L>())
            .field("closed", &self.is_closed())
            .field(
                "use_fully_qualified_names",
                &self.use_fully_qualified_names(),
            )
            .finish()
    }
}

impl<L> LoggerInner<L> {
    fn subscriptions_lock(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionId>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let ids = mem::take(&mut *self.subscriptions_lock());
        for id in ids {
            self.bus.unsubscribe(id);
        }
    }
}

impl<L> Drop for LoggerInner<L> {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch<L: Logger>(inner: &Weak<LoggerInner<L>>, event: &TestEvent) -> Result<(), HookError> {
    let Some(inner) = inner.upgrade() else {
        return Ok(());
    };
    let fully_qualified = inner.use_fully_qualified_names.load(Ordering::Relaxed);
    let mut logger = inner.logger.lock().unwrap_or_else(PoisonError::into_inner);
    match &event.kind {
        TestEventKind::RunStarted { total } => logger.on_test_run_started(*total),
        TestEventKind::TestStarted { test, .. } => {
            logger.on_test_started(test.display_name(fully_qualified), test)
        }
        TestEventKind::TestCompleted {
            test,
            outcome,
            time_taken,
            ..
        } => logger.on_test_completed(
            test.display_name(fully_qualified),
            test,
            outcome,
            *time_taken,
        ),
        TestEventKind::TestSkipped { test, reason, .. } => {
            logger.on_test_skipped(test.display_name(fully_qualified), test, reason)
        }
        TestEventKind::RunCompleted { summary } => logger.on_test_run_completed(summary),
    }
}
