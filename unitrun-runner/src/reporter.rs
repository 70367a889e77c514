// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle events, the bus that fans them out, and the logger abstraction built on top of it.
//!
//! The main structures in this module are [`EventBus`] and [`LoggerHandle`].

mod bus;
mod events;
mod logger;

pub use bus::*;
pub use events::*;
pub use logger::*;
