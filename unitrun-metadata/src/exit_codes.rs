// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for processes driving a unitrun run.
///
/// Runs may fail for a variety of reasons. This structure documents the exit codes that should be
/// used in case of expected failures; see [`RunStats::exit_code`](crate::RunStats::exit_code).
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum UnitrunExitCode {}

impl UnitrunExitCode {
    /// No errors occurred and the run completed normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more tests failed or threw, or the run was cancelled.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A logger failed while handling a lifecycle event.
    pub const LOGGER_ERROR: i32 = 110;

    /// A user issue happened while setting up a run, such as an invalid configuration.
    pub const SETUP_ERROR: i32 = 96;
}
