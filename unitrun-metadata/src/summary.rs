// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{OutcomeKind, SummaryParseError, UnitrunExitCode};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    ///
    /// This is the number of tests left after group filtering, before any skip classification.
    pub initial_run_count: usize,

    /// The total number of tests that reached a final outcome, including skipped ones.
    ///
    /// If the run was cancelled by an error this may be less than `initial_run_count`; cancelled
    /// tests are otherwise reported as skipped.
    pub final_run_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that signalled an assertion failure.
    pub failed: usize,

    /// The number of tests from which an error or panic escaped.
    pub threw: usize,

    /// The number of tests that were skipped, including cancelled tests.
    pub skipped: usize,

    /// The number of tests that aborted themselves.
    pub aborted: usize,

    /// Set if the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
}

impl RunStats {
    /// Creates a fresh set of statistics for a run of `initial_run_count` tests.
    pub fn new(initial_run_count: usize) -> Self {
        Self {
            initial_run_count,
            ..Self::default()
        }
    }

    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * the run was cancelled
    /// * not every test reached an outcome
    /// * any tests failed
    /// * any tests threw
    ///
    /// Skipped and aborted tests do not fail a run on their own.
    pub fn is_success(&self) -> bool {
        if self.cancel_reason.is_some() {
            return false;
        }
        if self.initial_run_count > self.final_run_count {
            return false;
        }
        if self.failed > 0 || self.threw > 0 {
            return false;
        }
        true
    }

    /// Returns the sum of all outcome counters.
    pub fn total_outcomes(&self) -> usize {
        self.passed + self.failed + self.threw + self.skipped + self.aborted
    }

    /// Records an outcome of the given kind.
    pub fn record(&mut self, kind: OutcomeKind) {
        self.final_run_count += 1;
        match kind {
            OutcomeKind::Passed => self.passed += 1,
            OutcomeKind::Failed => self.failed += 1,
            OutcomeKind::Threw => self.threw += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Aborted => self.aborted += 1,
        }
    }

    /// Returns the exit code a process driving this run should use.
    pub fn exit_code(&self) -> i32 {
        if self.initial_run_count == 0 {
            UnitrunExitCode::NO_TESTS_RUN
        } else if self.is_success() {
            UnitrunExitCode::OK
        } else if self.cancel_reason == Some(CancelReason::ReportError) {
            UnitrunExitCode::LOGGER_ERROR
        } else {
            UnitrunExitCode::TEST_RUN_FAILED
        }
    }
}

// Note: the order here matters -- it indicates severity of cancellation
/// The reason why a test run is being cancelled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    /// Cancellation was requested through the executor.
    Requested,

    /// An error occurred while delivering an event to a logger.
    ReportError,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "cancellation requested"),
            Self::ReportError => write!(f, "reporting error"),
        }
    }
}

/// A machine-readable summary of a completed run.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// The time at which the run was started.
    pub start_time: DateTime<FixedOffset>,

    /// How long the run took, from prepare to completion.
    pub elapsed: Duration,

    /// Final statistics.
    pub stats: RunStats,
}

impl RunSummary {
    /// Serializes this summary to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("RunSummary serialization is infallible")
    }

    /// Parses a summary previously produced by [`Self::to_json`].
    pub fn from_json(input: &str) -> Result<Self, SummaryParseError> {
        serde_json::from_str(input).map_err(SummaryParseError::new)
    }
}

#[cfg(feature = "proptest1")]
mod proptest_impls {
    use super::*;
    use proptest::prelude::*;

    impl Arbitrary for RunStats {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
            (
                [0..32usize, 0..32usize, 0..32usize, 0..32usize, 0..32usize],
                0..4usize,
                proptest::option::of(prop_oneof![
                    Just(CancelReason::Requested),
                    Just(CancelReason::ReportError),
                ]),
            )
                .prop_map(|([passed, failed, threw, skipped, aborted], missing, cancel_reason)| {
                    let final_run_count = passed + failed + threw + skipped + aborted;
                    RunStats {
                        initial_run_count: final_run_count + missing,
                        final_run_count,
                        passed,
                        failed,
                        threw,
                        skipped,
                        aborted,
                        cancel_reason,
                    }
                })
                .boxed()
        }
    }
}
