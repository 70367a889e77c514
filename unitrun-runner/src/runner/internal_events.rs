// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events sent from the code running tests to the coordinator.
//!
//! The coordinator is the only place that updates run statistics and raises lifecycle events. In
//! concurrent runs these events cross a channel from the worker threads; in sequential runs they
//! are handled inline.

use crate::list::TestDescriptor;
use chrono::{DateTime, FixedOffset};
use std::{sync::Arc, time::Duration};
use unitrun_metadata::{SkipReason, TestOutcome};

#[derive(Debug)]
pub(super) enum InternalTestEvent {
    Started {
        test: Arc<TestDescriptor>,
    },
    Finished {
        test: Arc<TestDescriptor>,
        outcome: TestOutcome,
        start_time: DateTime<FixedOffset>,
        time_taken: Duration,
    },
    Skipped {
        test: Arc<TestDescriptor>,
        reason: SkipReason,
    },
}
