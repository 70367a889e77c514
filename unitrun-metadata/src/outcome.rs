// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{any::Any, error, fmt};

/// Information captured from an error or panic that escaped user code.
///
/// The original error object is not kept around: test bodies and fixture constructors may run on
/// worker threads, and their errors need to cross back to the thread raising events.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorInfo {
    /// The type name of the error, or `panic` for panics.
    pub type_name: SmolStr,

    /// The error's display message.
    pub message: String,

    /// Messages from the error's source chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorInfo {
    /// The type name recorded for panics.
    pub const PANIC_TYPE_NAME: &'static str = "panic";

    /// Creates a new `ErrorInfo` with the given type name and message.
    pub fn new(type_name: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Captures an error, recording its concrete type name and source chain.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: error::Error,
    {
        Self::from_dyn_error(std::any::type_name::<E>(), error)
    }

    /// Captures a type-erased error under the given type name.
    pub fn from_dyn_error(
        type_name: impl Into<SmolStr>,
        error: &(dyn error::Error + '_),
    ) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            type_name: type_name.into(),
            message: error.to_string(),
            causes,
        }
    }

    /// Captures a panic payload as returned by [`std::panic::catch_unwind`].
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "(non-string panic payload)".to_owned()
        };
        Self::new(Self::PANIC_TYPE_NAME, message)
    }

    /// Returns true if this was captured from a panic.
    pub fn is_panic(&self) -> bool {
        self.type_name == Self::PANIC_TYPE_NAME
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// The reason a method is not a valid test.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "kind")]
#[non_exhaustive]
pub enum InvalidMethodReason {
    /// The method is not public.
    NotPublic,

    /// The method is static.
    Static,

    /// The method is abstract.
    Abstract,

    /// The method is generic.
    Generic,

    /// The method returns a value.
    ReturnsValue {
        /// The name of the returned type.
        type_name: String,
    },

    /// The method takes parameters other than a single test context.
    InvalidParameters {
        /// The number of parameters the method declares.
        count: usize,
    },

    /// The method is a pre- or post-test action.
    TestAction,
}

impl fmt::Display for InvalidMethodReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotPublic => write!(f, "method is not public"),
            Self::Static => write!(f, "method is static"),
            Self::Abstract => write!(f, "method is abstract"),
            Self::Generic => write!(f, "method is generic"),
            Self::ReturnsValue { type_name } => {
                write!(f, "method returns a value of type `{type_name}`")
            }
            Self::InvalidParameters { count } => write!(
                f,
                "method takes {count} parameter(s), expected none or a single test context"
            ),
            Self::TestAction => write!(f, "method is a pre- or post-test action"),
        }
    }
}

/// The reason a type cannot host tests.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
#[non_exhaustive]
pub enum InvalidTypeReason {
    /// The type is not public.
    NotPublic,

    /// The type is abstract.
    Abstract,

    /// The type is generic.
    Generic,

    /// The type is not a class.
    NotAClass,

    /// The type has no public parameterless constructor.
    NoDefaultConstructor,
}

impl fmt::Display for InvalidTypeReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotPublic => write!(f, "type is not public"),
            Self::Abstract => write!(f, "type is abstract"),
            Self::Generic => write!(f, "type is generic"),
            Self::NotAClass => write!(f, "type is not a class"),
            Self::NoDefaultConstructor => {
                write!(f, "type has no public parameterless constructor")
            }
        }
    }
}

/// The reason a test was not executed.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
#[non_exhaustive]
pub enum SkipReason {
    /// The test is explicitly marked as skipped.
    SkipTestAttributeDefined {
        /// The reason given by the skip marker, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The declaring type cannot host tests.
    TypeNotSupported {
        /// Why the type was rejected.
        cause: InvalidTypeReason,
    },

    /// The method is not a valid test.
    MethodNotSupported {
        /// Why the method was rejected.
        cause: InvalidMethodReason,
    },

    /// Constructing the fixture failed.
    ConstructorThrewException {
        /// The error raised by the constructor.
        error: ErrorInfo,
    },

    /// The method is itself a pre- or post-test action.
    TestActionAttributeDefined,

    /// A pre-test action vetoed this test.
    VetoedByPreAction {
        /// The message passed by the pre-test action, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The run was cancelled before this test started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SkipTestAttributeDefined { message: Some(message) } => {
                write!(f, "marked as skipped: {message}")
            }
            Self::SkipTestAttributeDefined { message: None } => write!(f, "marked as skipped"),
            Self::TypeNotSupported { cause } => write!(f, "type not supported ({cause})"),
            Self::MethodNotSupported { cause } => write!(f, "method not supported ({cause})"),
            Self::ConstructorThrewException { error } => {
                write!(f, "fixture constructor failed ({error})")
            }
            Self::TestActionAttributeDefined => write!(f, "method is a test action"),
            Self::VetoedByPreAction { message: Some(message) } => {
                write!(f, "vetoed by pre-test action: {message}")
            }
            Self::VetoedByPreAction { message: None } => write!(f, "vetoed by pre-test action"),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// The outcome of a single test invocation.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum TestOutcome {
    /// The test body returned normally.
    Passed,

    /// The test body signalled an assertion-style failure.
    Failed {
        /// The assertion message.
        assertion: String,

        /// An optional message from the test author.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// An error or panic escaped the test body.
    Threw {
        /// The captured error.
        error: ErrorInfo,
    },

    /// The test body voluntarily stopped early.
    Aborted {
        /// An optional message from the test author.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl TestOutcome {
    /// Returns the kind of this outcome.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Passed => OutcomeKind::Passed,
            Self::Failed { .. } => OutcomeKind::Failed,
            Self::Threw { .. } => OutcomeKind::Threw,
            Self::Aborted { .. } => OutcomeKind::Aborted,
        }
    }

    /// Returns true if this outcome counts against the run.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Threw { .. })
    }
}

/// The kind of a [`TestOutcome`], without its payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// See [`TestOutcome::Passed`].
    Passed,
    /// See [`TestOutcome::Failed`].
    Failed,
    /// See [`TestOutcome::Threw`].
    Threw,
    /// The test was not executed. The cause is a [`SkipReason`].
    Skipped,
    /// See [`TestOutcome::Aborted`].
    Aborted,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Passed => f.pad("PASS"),
            Self::Failed => f.pad("FAIL"),
            Self::Threw => f.pad("THREW"),
            Self::Skipped => f.pad("SKIP"),
            Self::Aborted => f.pad("ABORT"),
        }
    }
}
