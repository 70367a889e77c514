// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for unitrun, a lightweight unit-testing framework.
//!
//! The flow of a run is:
//!
//! 1. Test types and their methods are described through the [`registry`], usually with a
//!    [`SuiteBuilder`](registry::SuiteBuilder).
//! 2. The [`inspect`] module validates candidate methods and describes them as
//!    [`TestDescriptor`](list::TestDescriptor)s, which are grouped into a
//!    [`TestList`](list::TestList).
//! 3. A [`TestExecutor`](runner::TestExecutor) runs the list, sequentially or on a pool of worker
//!    threads, keeping one fixture instance alive per declaring type.
//! 4. Lifecycle events are raised on an [`EventBus`](reporter::EventBus), either immediately or
//!    marshaled through a [`DispatchQueue`](dispatch::DispatchQueue), and consumed by
//!    [`Logger`](reporter::Logger)s.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fixture;
mod helpers;
pub mod inspect;
mod instance;
pub mod list;
pub mod registry;
pub mod reporter;
pub mod runner;
mod stopwatch;
pub mod test_filter;
