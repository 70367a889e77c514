// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while parsing a [`RunSummary`](crate::RunSummary) from JSON.
#[derive(Debug)]
pub struct SummaryParseError {
    err: serde_json::Error,
}

impl SummaryParseError {
    pub(crate) fn new(err: serde_json::Error) -> Self {
        Self { err }
    }
}

impl fmt::Display for SummaryParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "error parsing run summary at line {}, column {}",
            self.err.line(),
            self.err.column()
        )
    }
}

impl error::Error for SummaryParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}
