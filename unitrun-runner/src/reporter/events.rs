// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::list::TestDescriptor;
use chrono::{DateTime, FixedOffset};
use std::{fmt, sync::Arc, time::Duration};
use unitrun_metadata::{RunStats, RunSummary, SkipReason, TestOutcome};

/// A lifecycle event.
///
/// Events are produced by a [`TestExecutor`](crate::runner::TestExecutor) and delivered through
/// the [`EventBus`](super::EventBus).
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated, including the offset from UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the start of the test run.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

impl TestEvent {
    /// Returns the kind of subscription this event is delivered to.
    pub fn event_kind(&self) -> EventKind {
        self.kind.event_kind()
    }
}

/// The kind of test event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// The test run started.
    RunStarted {
        /// The number of tests that will be run, after group filtering.
        total: usize,
    },

    /// A test started.
    ///
    /// Every test gets this event, including ones that end up skipped.
    TestStarted {
        /// The test.
        test: Arc<TestDescriptor>,

        /// The number of tests currently running, including this one.
        running: usize,

        /// Statistics for the run so far.
        current_stats: RunStats,
    },

    /// A test ran to an outcome other than skipped.
    TestCompleted {
        /// The test.
        test: Arc<TestDescriptor>,

        /// The outcome.
        outcome: TestOutcome,

        /// When the test body started.
        start_time: DateTime<FixedOffset>,

        /// How long the test body took.
        time_taken: Duration,

        /// Statistics for the run so far, including this test.
        current_stats: RunStats,

        /// The number of tests still running.
        running: usize,
    },

    /// A test was skipped.
    TestSkipped {
        /// The test.
        test: Arc<TestDescriptor>,

        /// Why it was skipped.
        reason: SkipReason,

        /// Statistics for the run so far, including this test.
        current_stats: RunStats,

        /// The number of tests still running.
        running: usize,
    },

    /// The test run finished.
    RunCompleted {
        /// The run summary.
        summary: RunSummary,
    },
}

impl TestEventKind {
    /// Returns the kind of subscription this event is delivered to.
    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::RunStarted { .. } => EventKind::RunStarted,
            Self::TestStarted { .. } => EventKind::TestStarted,
            Self::TestCompleted { .. } => EventKind::TestCompleted,
            Self::TestSkipped { .. } => EventKind::TestSkipped,
            Self::RunCompleted { .. } => EventKind::RunCompleted,
        }
    }

    /// Returns the test this event is about, if it is a per-test event.
    pub fn test(&self) -> Option<&Arc<TestDescriptor>> {
        match self {
            Self::TestStarted { test, .. }
            | Self::TestCompleted { test, .. }
            | Self::TestSkipped { test, .. } => Some(test),
            Self::RunStarted { .. } | Self::RunCompleted { .. } => None,
        }
    }
}

/// The five kinds of lifecycle events loggers can subscribe to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum EventKind {
    /// See [`TestEventKind::RunStarted`].
    RunStarted,
    /// See [`TestEventKind::TestStarted`].
    TestStarted,
    /// See [`TestEventKind::TestCompleted`].
    TestCompleted,
    /// See [`TestEventKind::TestSkipped`].
    TestSkipped,
    /// See [`TestEventKind::RunCompleted`].
    RunCompleted,
}

impl EventKind {
    /// All event kinds, in lifecycle order.
    pub const ALL: [EventKind; 5] = [
        Self::RunStarted,
        Self::TestStarted,
        Self::TestCompleted,
        Self::TestSkipped,
        Self::RunCompleted,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted => write!(f, "test run started"),
            Self::TestStarted => write!(f, "test started"),
            Self::TestCompleted => write!(f, "test completed"),
            Self::TestSkipped => write!(f, "test skipped"),
            Self::RunCompleted => write!(f, "test run completed"),
        }
    }
}
