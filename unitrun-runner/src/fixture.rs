// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures, the per-test context and the signals a test body can return.

use crate::{errors::HookError, list::TestDescriptor};
use std::{
    any::Any,
    error, fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use unitrun_metadata::ErrorInfo;

/// An instance of a type hosting tests.
///
/// One fixture is constructed per declaring type and reused by consecutive tests of that type
/// within a worker. It is torn down when the worker moves on to a different type or the run ends.
pub trait Fixture: Any + Send {
    /// Releases resources held by this fixture.
    ///
    /// Called once, right before the fixture is dropped. Errors and panics are logged and
    /// otherwise ignored.
    fn teardown(&mut self) -> Result<(), HookError> {
        Ok(())
    }
}

/// The result returned by test bodies and test actions.
pub type TestResult = Result<(), TestSignal>;

/// A non-passing signal returned from a test body or test action.
///
/// Any [`std::error::Error`] converts into `TestSignal::Error` through `?`, recording the error's
/// concrete type name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestSignal {
    /// An assertion failed.
    Fail {
        /// Describes the assertion that failed.
        assertion: String,

        /// An optional message from the test author.
        message: Option<String>,
    },

    /// The test stopped voluntarily.
    Abort {
        /// An optional message from the test author.
        message: Option<String>,
    },

    /// Skip the test. Only meaningful from a pre-test action, where it vetoes the test body.
    Skip {
        /// An optional message from the test author.
        message: Option<String>,
    },

    /// An error escaped.
    Error(ErrorInfo),
}

impl TestSignal {
    /// Creates an assertion failure without a user message.
    pub fn fail(assertion: impl Into<String>) -> Self {
        Self::Fail {
            assertion: assertion.into(),
            message: None,
        }
    }

    /// Creates an assertion failure with a user message.
    pub fn fail_with_message(assertion: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fail {
            assertion: assertion.into(),
            message: Some(message.into()),
        }
    }

    /// Creates an abort signal.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: Some(message.into()),
        }
    }

    /// Creates a skip signal.
    pub fn skip(message: impl Into<String>) -> Self {
        Self::Skip {
            message: Some(message.into()),
        }
    }
}

// TestSignal must not implement std::error::Error, otherwise this would overlap with
// `impl<T> From<T> for T`.
impl<E> From<E> for TestSignal
where
    E: error::Error,
{
    fn from(error: E) -> Self {
        Self::Error(ErrorInfo::from_error(&error))
    }
}

impl fmt::Display for TestSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail { assertion, message } => {
                write!(f, "assertion failed: {assertion}")?;
                if let Some(message) = message {
                    write!(f, " ({message})")?;
                }
                Ok(())
            }
            Self::Abort { message: Some(message) } => write!(f, "aborted: {message}"),
            Self::Abort { message: None } => write!(f, "aborted"),
            Self::Skip { message: Some(message) } => write!(f, "skipped: {message}"),
            Self::Skip { message: None } => write!(f, "skipped"),
            Self::Error(info) => write!(f, "{info}"),
        }
    }
}

/// A cloneable handle that requests cancellation of the current run.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Requests cancellation. Tests that have not started yet are skipped.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Context passed to test bodies and test actions.
pub struct TestContext {
    test: Arc<TestDescriptor>,
    cancel: CancelHandle,
}

impl TestContext {
    pub(crate) fn new(test: Arc<TestDescriptor>, cancel: CancelHandle) -> Self {
        Self { test, cancel }
    }

    /// The test being run. Within a test action this is the test the action wraps.
    pub fn test(&self) -> &TestDescriptor {
        &self.test
    }

    /// The short name of the test method.
    pub fn name(&self) -> &str {
        self.test.name()
    }

    /// The fully-qualified name of the test method.
    pub fn full_name(&self) -> &str {
        self.test.full_name()
    }

    /// Returns true if the test belongs to the given group.
    pub fn in_group(&self, group: &str) -> bool {
        self.test.groups().contains(group)
    }

    /// Returns a handle that can cancel the run.
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Returns an abort signal, for `return Err(cx.abort("..."))`.
    pub fn abort(&self, message: impl Into<String>) -> TestSignal {
        TestSignal::abort(message)
    }

    /// Returns a skip signal, for use in pre-test actions.
    pub fn skip(&self, message: impl Into<String>) -> TestSignal {
        TestSignal::skip(message)
    }

    /// Fails with `assertion` unless `condition` holds.
    pub fn check(&self, condition: bool, assertion: impl Into<String>) -> TestResult {
        if condition {
            Ok(())
        } else {
            Err(TestSignal::fail(assertion))
        }
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("test", &self.test.full_name())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
