// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by unitrun.

use crate::reporter::EventKind;
use camino::Utf8PathBuf;
use config::ConfigError;
use smol_str::SmolStr;
use std::{borrow::Cow, error, fmt, io};
use thiserror::Error;
use unitrun_metadata::ErrorInfo;

/// The error type returned by [`Logger`](crate::reporter::Logger) hooks and bus callbacks.
pub type HookError = Box<dyn error::Error + Send + Sync>;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse unitrun config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error which indicates that a profile was requested but not known to unitrun.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// A group tag passed to a [`GroupFilter`](crate::test_filter::GroupFilter) was invalid.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("group tags must not be empty or whitespace-only (got {tag:?})")]
pub struct InvalidGroupError {
    tag: String,
}

impl InvalidGroupError {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

/// An error raised by a logger while handling a lifecycle event.
///
/// Hooks may return this type directly, in which case it is propagated unchanged. Any other error
/// returned by a hook, as well as a panic, is wrapped into a `LoggerError` naming the logger type
/// and the event being handled.
#[derive(Debug, Error)]
#[error("logger `{logger_type}` failed while handling {phase}")]
pub struct LoggerError {
    logger_type: SmolStr,
    phase: EventKind,
    #[source]
    source: HookError,
}

impl LoggerError {
    /// Creates a new `LoggerError`.
    pub fn new(
        logger_type: impl Into<SmolStr>,
        phase: EventKind,
        source: impl Into<HookError>,
    ) -> Self {
        Self {
            logger_type: logger_type.into(),
            phase,
            source: source.into(),
        }
    }

    /// Returns the type name of the logger that failed.
    pub fn logger_type(&self) -> &str {
        &self.logger_type
    }

    /// Returns the event that was being handled.
    pub fn phase(&self) -> EventKind {
        self.phase
    }

    /// Returns the underlying error.
    pub fn inner(&self) -> &(dyn error::Error + Send + Sync + 'static) {
        &*self.source
    }
}

/// A panic caught at a logger or teardown boundary.
#[derive(Clone, Debug, Error)]
#[error("panicked: {}", .0.message)]
pub struct PanicError(pub ErrorInfo);

/// An error that occurred while delivering an event through the dispatch policy.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Event marshaling was enabled, but no dispatch queue was installed on the thread that
    /// started the run.
    #[error("event marshaling is enabled but no dispatch context was captured at run start")]
    NoContext,

    /// The dispatch queue was dropped before the event could be delivered.
    #[error("the dispatch queue was dropped before the event was delivered")]
    Disconnected,
}

/// An error returned by the [`TestExecutor`](crate::runner::TestExecutor).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecuteError {
    /// A run was started while another one was preparing or running.
    #[error("a test run is already in progress on this executor")]
    RunInProgress,

    /// A setting was changed while a run was in progress.
    #[error("cannot change `{setting}` while a test run is in progress")]
    SettingsLocked {
        /// The name of the setting.
        setting: &'static str,
    },

    /// An argument was out of range.
    #[error("invalid value for `{name}`: {message}")]
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,

        /// What was wrong with it.
        message: Cow<'static, str>,
    },

    /// A logger failed while handling an event. The rest of the run was cancelled.
    #[error("error reporting test run events")]
    Logger(#[from] LoggerError),

    /// An event could not be delivered through the dispatch policy.
    #[error("error dispatching test run events")]
    Dispatch(#[from] DispatchError),

    /// The worker pool for a concurrent run could not be built.
    #[error("error building the worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The thread for an asynchronous run could not be spawned.
    #[error("error spawning the test run thread")]
    SpawnRun(#[source] io::Error),

    /// The thread for an asynchronous run panicked.
    #[error("the test run thread panicked: {0}")]
    RunPanicked(ErrorInfo),
}

impl ExecuteError {
    pub(crate) fn invalid_argument(
        name: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }
}

/// Adapter that displays an error along with its chain of sources.
pub struct DisplayErrorChain<E>(E);

impl<E> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
