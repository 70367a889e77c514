// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::Empty;
use pretty_assertions::assert_eq;
use std::{io, sync::Arc, time::Duration};
use unitrun_metadata::{CancelReason, RunSummary, SkipReason, TestOutcome};
use unitrun_runner::{
    errors::{ExecuteError, HookError, LoggerError},
    list::TestDescriptor,
    registry::{MethodRef, SuiteBuilder, TypeInfo},
    reporter::{EventKind, Logger, LoggerHandle},
    runner::TestExecutor,
};

#[derive(Default)]
struct ConsoleLogger {
    lines: Vec<String>,
}

impl Logger for ConsoleLogger {
    fn on_test_run_started(&mut self, total: usize) -> Result<(), HookError> {
        self.lines.push(format!("starting {total} tests"));
        Ok(())
    }

    fn on_test_started(&mut self, name: &str, _: &TestDescriptor) -> Result<(), HookError> {
        self.lines.push(format!("START {name}"));
        Ok(())
    }

    fn on_test_completed(
        &mut self,
        name: &str,
        _: &TestDescriptor,
        outcome: &TestOutcome,
        _: Duration,
    ) -> Result<(), HookError> {
        self.lines.push(format!("{:>5} {name}", outcome.kind()));
        Ok(())
    }

    fn on_test_skipped(
        &mut self,
        name: &str,
        _: &TestDescriptor,
        reason: &SkipReason,
    ) -> Result<(), HookError> {
        self.lines.push(format!(" SKIP {name}: {reason}"));
        Ok(())
    }

    fn on_test_run_completed(&mut self, summary: &RunSummary) -> Result<(), HookError> {
        self.lines.push(format!(
            "{} passed, {} skipped",
            summary.stats.passed, summary.stats.skipped
        ));
        Ok(())
    }
}

struct FailingLogger {
    fail_in: EventKind,
}

impl Logger for FailingLogger {
    fn on_test_started(&mut self, _: &str, _: &TestDescriptor) -> Result<(), HookError> {
        match self.fail_in {
            EventKind::TestStarted => Err(io::Error::other("terminal closed").into()),
            _ => Ok(()),
        }
    }

    fn on_test_run_completed(&mut self, _: &RunSummary) -> Result<(), HookError> {
        match self.fail_in {
            EventKind::RunCompleted => Err(LoggerError::new(
                "custom::Reporter",
                EventKind::RunCompleted,
                io::Error::other("flush failed"),
            )
            .into()),
            _ => Ok(()),
        }
    }
}

fn suite() -> Arc<TypeInfo> {
    SuiteBuilder::<Empty>::new("app.Logging")
        .default_constructor()
        .test("first", |_, _| Ok(()))
        .test_with("second", |_, _| Ok(()), |m| m.skip(Some("later")))
        .test("third", |_, _| Ok(()))
        .build()
}

#[test]
fn logger_receives_all_events() {
    let executor = TestExecutor::new();
    let logger = LoggerHandle::attach(&executor, ConsoleLogger::default());

    executor
        .execute(MethodRef::tests_of(&suite()))
        .expect("run completes");
    logger.set_use_fully_qualified_names(true);
    executor
        .execute(MethodRef::tests_of(&suite()).take(1))
        .expect("run completes");

    assert_eq!(
        logger.with_logger(|l| l.lines.clone()),
        vec![
            "starting 3 tests",
            "START first",
            " PASS first",
            "START second",
            " SKIP second: marked as skipped: later",
            "START third",
            " PASS third",
            "2 passed, 1 skipped",
            "starting 1 tests",
            "START app.Logging.first",
            " PASS app.Logging.first",
            "1 passed, 0 skipped",
        ]
    );
}

#[test]
fn close_is_idempotent() {
    let executor = TestExecutor::new();
    let logger = LoggerHandle::attach(&executor, ConsoleLogger::default());
    logger.close();
    logger.close();
    assert!(logger.is_closed());
    for kind in EventKind::ALL {
        assert_eq!(executor.events().subscriber_count(kind), 0);
    }

    executor
        .execute(MethodRef::tests_of(&suite()))
        .expect("run completes");
    assert!(logger.with_logger(|l| l.lines.is_empty()));
}

#[test]
fn logger_error_names_logger_and_phase() {
    let executor = TestExecutor::new();
    let logger = LoggerHandle::attach(
        &executor,
        FailingLogger {
            fail_in: EventKind::TestStarted,
        },
    );

    let error = executor
        .execute(MethodRef::tests_of(&suite()))
        .expect_err("logger fails");
    let error = match error {
        ExecuteError::Logger(error) => error,
        other => panic!("expected a logger error, got {other:?}"),
    };
    assert_eq!(error.logger_type(), std::any::type_name::<FailingLogger>());
    assert_eq!(error.phase(), EventKind::TestStarted);
    assert_eq!(error.inner().to_string(), "terminal closed");

    // The failure cancels the rest of the run.
    let stats = executor.current_stats();
    assert_eq!(stats.cancel_reason, Some(CancelReason::ReportError));
    assert_eq!(stats.passed, 0);
    assert_eq!(stats.total_outcomes(), 3);

    // Once the logger is closed, the same executor runs normally.
    logger.close();
    let stats = executor
        .execute(MethodRef::tests_of(&suite()))
        .expect("run completes");
    assert_eq!((stats.passed, stats.skipped), (2, 1));

    // So does a fresh executor.
    let stats = TestExecutor::new()
        .execute(MethodRef::tests_of(&suite()))
        .expect("run completes");
    assert!(stats.is_success());
}

#[test]
fn logger_errors_pass_through_unwrapped() {
    let executor = TestExecutor::new();
    let _logger = LoggerHandle::attach(
        &executor,
        FailingLogger {
            fail_in: EventKind::RunCompleted,
        },
    );

    let error = executor
        .execute(MethodRef::tests_of(&suite()))
        .expect_err("logger fails");
    let error = match error {
        ExecuteError::Logger(error) => error,
        other => panic!("expected a logger error, got {other:?}"),
    };
    assert_eq!(error.logger_type(), "custom::Reporter");
    assert_eq!(error.phase(), EventKind::RunCompleted);
    assert_eq!(error.inner().to_string(), "flush failed");
}

#[test]
fn panicking_logger_is_reported() {
    struct PanickingLogger;
    impl Logger for PanickingLogger {
        fn on_test_run_started(&mut self, _: usize) -> Result<(), HookError> {
            panic!("logger bug");
        }
    }

    let executor = TestExecutor::new();
    let _logger = LoggerHandle::attach(&executor, PanickingLogger);
    let error = executor
        .execute(MethodRef::tests_of(&suite()))
        .expect_err("logger panics");
    let error = match error {
        ExecuteError::Logger(error) => error,
        other => panic!("expected a logger error, got {other:?}"),
    };
    assert_eq!(error.phase(), EventKind::RunStarted);
    assert_eq!(error.inner().to_string(), "panicked: logger bug");

    let stats = executor.current_stats();
    assert_eq!(stats.skipped, 3, "no test runs after the run-started hook fails");
}
