// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::panic::{self, AssertUnwindSafe};
use unitrun_metadata::ErrorInfo;

/// Runs user code, converting a panic into an [`ErrorInfo`].
///
/// User code is treated as unwind-safe: a fixture that panicked mid-test is still reused by the
/// next test of the same type, matching how an error return would leave it.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, ErrorInfo> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| ErrorInfo::from_panic(&*payload))
}

/// Splits a fully-qualified type name into its namespace and name at the last `.`.
pub(crate) fn split_type_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once('.') {
        Some((namespace, name)) => (namespace, name),
        None => ("", full_name),
    }
}
