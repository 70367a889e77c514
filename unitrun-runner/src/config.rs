// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for unitrun.
//!
//! Settings are read from an embedded default config, overlaid by `.config/unitrun.toml` under a
//! root directory (or an explicitly named file). Settings are grouped into named profiles; the
//! `default` profile always exists and supplies every value a custom profile leaves out.

mod imp;
mod test_threads;

pub use imp::*;
pub use test_threads::*;
