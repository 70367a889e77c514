// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test executor.
//!
//! The main structure in this module is [`TestExecutor`].

mod executor;
mod imp;
mod internal_events;

pub use imp::*;
