// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test descriptors and the fixed, filtered list of tests a run executes.

use crate::{
    inspect,
    registry::{MethodRef, TypeInfo},
    test_filter::GroupFilter,
};
use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;
use std::{collections::BTreeSet, fmt, sync::Arc};

/// An explicit skip marker on a test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkipMarker {
    /// The reason given, if any.
    pub reason: Option<String>,
}

/// The pre- and post-test actions of a declaring type.
#[derive(Clone, Debug, Default)]
pub struct TestActions {
    pub(crate) pre: Vec<MethodRef>,
    pub(crate) post: Vec<MethodRef>,
}

impl TestActions {
    /// Pre-test actions, in declaration order.
    pub fn pre(&self) -> &[MethodRef] {
        &self.pre
    }

    /// Post-test actions, in declaration order.
    pub fn post(&self) -> &[MethodRef] {
        &self.post
    }
}

/// Everything known about a candidate test, derived from its metadata.
#[derive(Clone, Debug)]
pub struct TestDescriptor {
    pub(crate) method: MethodRef,
    pub(crate) name: SmolStr,
    pub(crate) full_name: String,
    pub(crate) description: Option<String>,
    pub(crate) groups: BTreeSet<SmolStr>,
    pub(crate) skip: Option<SkipMarker>,
    pub(crate) is_pre_action: bool,
    pub(crate) is_post_action: bool,
    pub(crate) actions: Arc<TestActions>,
}

impl TestDescriptor {
    /// The method this descriptor was derived from.
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// The declaring type.
    pub fn declaring_type(&self) -> &Arc<TypeInfo> {
        self.method.declaring_type()
    }

    /// The short method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully-qualified name: `namespace.Type.method`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the name to display, fully qualified or not.
    pub fn display_name(&self, fully_qualified: bool) -> &str {
        if fully_qualified {
            &self.full_name
        } else {
            &self.name
        }
    }

    /// The description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The group tags.
    pub fn groups(&self) -> &BTreeSet<SmolStr> {
        &self.groups
    }

    /// The explicit skip marker, if any.
    pub fn skip_marker(&self) -> Option<&SkipMarker> {
        self.skip.as_ref()
    }

    /// Whether the method is a pre-test action.
    pub fn is_pre_action(&self) -> bool {
        self.is_pre_action
    }

    /// Whether the method is a post-test action.
    pub fn is_post_action(&self) -> bool {
        self.is_post_action
    }

    /// The actions of the declaring type.
    pub fn actions(&self) -> &TestActions {
        &self.actions
    }
}

impl fmt::Display for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// How tests are split into units of work for concurrent runs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partitioning {
    /// All tests of a declaring type form one unit and share a fixture slot.
    #[default]
    ByType,

    /// Every test is its own unit with its own fixture slot.
    PerTest,
}

/// A group of tests sharing a declaring type, in run order.
#[derive(Clone, Debug)]
pub struct TypeGroup {
    ty: Arc<TypeInfo>,
    tests: Vec<Arc<TestDescriptor>>,
}

impl TypeGroup {
    /// The declaring type.
    pub fn declaring_type(&self) -> &Arc<TypeInfo> {
        &self.ty
    }

    /// The tests, in run order.
    pub fn tests(&self) -> &[Arc<TestDescriptor>] {
        &self.tests
    }
}

/// The fixed list of tests selected for a run.
///
/// Tests are grouped by declaring type, groups in order of first appearance. Within a group tests
/// keep the order they were supplied in, or are stably sorted by method name.
#[derive(Clone, Debug, Default)]
pub struct TestList {
    groups: Vec<TypeGroup>,
    test_count: usize,
}

impl TestList {
    /// Builds the list from candidate methods, applying the group filter once.
    pub fn new(
        methods: impl IntoIterator<Item = MethodRef>,
        filter: &GroupFilter,
        sort_by_name: bool,
    ) -> Self {
        // Keyed by type identity. Actions are computed once per type.
        let mut by_type: IndexMap<*const TypeInfo, (Arc<TestActions>, TypeGroup)> =
            IndexMap::new();
        for method in methods {
            let ty = method.declaring_type().clone();
            let (actions, group) = by_type.entry(Arc::as_ptr(&ty)).or_insert_with(|| {
                (
                    Arc::new(inspect::test_actions(&ty)),
                    TypeGroup {
                        ty: ty.clone(),
                        tests: Vec::new(),
                    },
                )
            });
            let test = inspect::describe_with_actions(&method, actions.clone());
            if filter.matches(&test) {
                group.tests.push(Arc::new(test));
            }
        }

        let mut groups: Vec<_> = by_type
            .into_values()
            .map(|(_, group)| group)
            .filter(|group| !group.tests.is_empty())
            .collect();
        if sort_by_name {
            for group in &mut groups {
                group.tests.sort_by(|a, b| a.name.cmp(&b.name));
            }
        }
        let test_count = groups.iter().map(|group| group.tests.len()).sum();
        Self { groups, test_count }
    }

    /// The number of tests in the list.
    pub fn test_count(&self) -> usize {
        self.test_count
    }

    /// Returns true if the list has no tests.
    pub fn is_empty(&self) -> bool {
        self.test_count == 0
    }

    /// The type groups, in run order.
    pub fn groups(&self) -> &[TypeGroup] {
        &self.groups
    }

    /// Iterates over all tests in run order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TestDescriptor>> + '_ {
        self.groups.iter().flat_map(|group| group.tests.iter())
    }

    /// Splits the list into units of work. Each unit is run by one worker with its own fixture
    /// slot.
    pub fn work_units(&self, partitioning: Partitioning) -> Vec<Vec<Arc<TestDescriptor>>> {
        match partitioning {
            Partitioning::ByType => self.groups.iter().map(|group| group.tests.clone()).collect(),
            Partitioning::PerTest => self.iter().map(|test| vec![test.clone()]).collect(),
        }
    }
}
