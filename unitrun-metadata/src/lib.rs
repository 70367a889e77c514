// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured data produced by the unitrun executor core.
//!
//! The types here are shared between the executor in `unitrun-runner` and anything consuming its
//! results: loggers, report writers, or processes that read back a serialized [`RunSummary`].

mod errors;
mod exit_codes;
mod outcome;
mod summary;

pub use errors::*;
pub use exit_codes::*;
pub use outcome::*;
pub use summary::*;
