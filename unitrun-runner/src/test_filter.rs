// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering tests by group tags.

use crate::{errors::InvalidGroupError, list::TestDescriptor};
use smol_str::SmolStr;
use std::collections::BTreeSet;

/// Selects tests belonging to at least one of a set of groups.
///
/// An empty filter selects every test.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupFilter {
    groups: BTreeSet<SmolStr>,
}

impl GroupFilter {
    /// Returns a filter that matches all tests.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter from group tags. Empty or whitespace-only tags are rejected.
    pub fn new<I, S>(groups: I) -> Result<Self, InvalidGroupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let groups = groups
            .into_iter()
            .map(|group| {
                let group = group.as_ref();
                if group.trim().is_empty() {
                    Err(InvalidGroupError::new(group))
                } else {
                    Ok(SmolStr::new(group))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { groups })
    }

    /// Returns true if this filter matches every test.
    pub fn is_all(&self) -> bool {
        self.groups.is_empty()
    }

    /// The group tags.
    pub fn groups(&self) -> &BTreeSet<SmolStr> {
        &self.groups
    }

    /// Returns true if the test should be run.
    pub fn matches(&self, test: &TestDescriptor) -> bool {
        self.is_all() || !self.groups.is_disjoint(test.groups())
    }
}
