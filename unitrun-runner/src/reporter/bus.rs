// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{EventKind, TestEvent};
use crate::{
    dispatch::DispatchPolicy,
    errors::{DisplayErrorChain, ExecuteError, HookError, LoggerError, PanicError},
    helpers::catch_panic,
};
use smol_str::SmolStr;
use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

type Callback = Arc<dyn Fn(&TestEvent) -> Result<(), HookError> + Send + Sync>;

/// Identifies a subscription on an [`EventBus`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    owner: SmolStr,
    callback: Callback,
}

/// Fans lifecycle events out to subscribers.
///
/// Subscribers are kept per event kind, in subscription order. The subscriber lists are guarded by
/// their own lock, which is not held while callbacks run: a callback may subscribe or unsubscribe
/// without deadlocking, and such changes take effect from the next event.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<[Vec<Subscriber>; EventKind::ALL.len()]>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `callback` to events of `kind`.
    ///
    /// Errors returned by the callback are attributed to the callback's type.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&TestEvent) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.subscribe_as(kind, std::any::type_name::<F>(), callback)
    }

    /// Subscribes `callback` to events of `kind`, attributing its errors to `owner`.
    pub fn subscribe_as<F>(
        &self,
        kind: EventKind,
        owner: impl Into<SmolStr>,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&TestEvent) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()[kind.index()].push(Subscriber {
            id,
            owner: owner.into(),
            callback: Arc::new(callback),
        });
        id
    }

    /// Removes a subscription. Returns false if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        for list in subscribers.iter_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Returns the number of subscribers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock()[kind.index()].len()
    }

    /// Delivers an event to every subscriber of its kind, on the current thread.
    ///
    /// Every subscriber is called even if an earlier one fails. A [`LoggerError`] returned by a
    /// subscriber is kept as-is; other errors and panics are wrapped. The first error is returned.
    pub fn raise(&self, event: &TestEvent) -> Result<(), LoggerError> {
        let kind = event.event_kind();
        let subscribers = self.lock()[kind.index()].clone();

        let mut first_error = None;
        for subscriber in subscribers {
            let error = match catch_panic(|| (subscriber.callback)(event)) {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => match error.downcast::<LoggerError>() {
                    Ok(error) => *error,
                    Err(error) => LoggerError::new(subscriber.owner, kind, error),
                },
                Err(info) => LoggerError::new(subscriber.owner, kind, PanicError(info)),
            };
            if first_error.is_none() {
                first_error = Some(error);
            } else {
                debug!(
                    "additional error while handling {kind}: {}",
                    DisplayErrorChain::new(&error)
                );
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Delivers an event according to the dispatch policy.
    pub(crate) fn publish(
        self: &Arc<Self>,
        event: TestEvent,
        policy: &DispatchPolicy,
    ) -> Result<(), ExecuteError> {
        match policy {
            DispatchPolicy::Immediate => self.raise(&event)?,
            DispatchPolicy::Marshaled(dispatcher) => {
                let bus = self.clone();
                dispatcher.invoke(move || bus.raise(&event))??
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, [Vec<Subscriber>; EventKind::ALL.len()]> {
        // Callbacks never run under this lock, so poisoning cannot leave the lists half-updated.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.lock();
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind, &subscribers[kind.index()].len());
        }
        map.finish()
    }
}
