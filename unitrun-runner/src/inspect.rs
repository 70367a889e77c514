// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validation and description of candidate test methods.
//!
//! Everything here is pure: methods are inspected through their metadata and never invoked.

use crate::{
    list::{SkipMarker, TestActions, TestDescriptor},
    registry::{
        Attribute, MethodInfo, MethodRef, ParamKind, ReturnKind, TypeInfo, TypeKind, Visibility,
    },
};
use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::warn;
use unitrun_metadata::{InvalidMethodReason, InvalidTypeReason, SkipReason};

/// Why a candidate is not a runnable test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InvalidReason {
    /// The declaring type cannot host tests.
    Type(InvalidTypeReason),
    /// The method itself is not a valid test.
    Method(InvalidMethodReason),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(reason) => write!(f, "{reason}"),
            Self::Method(reason) => write!(f, "{reason}"),
        }
    }
}

/// Checks that a type can host tests: public, concrete, non-generic, a class, and constructible
/// through a public parameterless constructor.
pub fn validate_type(ty: &TypeInfo) -> Result<(), InvalidTypeReason> {
    if ty.get_visibility() != Visibility::Public {
        return Err(InvalidTypeReason::NotPublic);
    }
    if ty.is_abstract() {
        return Err(InvalidTypeReason::Abstract);
    }
    if ty.is_generic() {
        return Err(InvalidTypeReason::Generic);
    }
    if ty.get_kind() != TypeKind::Class {
        return Err(InvalidTypeReason::NotAClass);
    }
    match ty.get_constructor() {
        Some(ctor) if ctor.is_public_parameterless() => Ok(()),
        _ => Err(InvalidTypeReason::NoDefaultConstructor),
    }
}

/// Checks that a method is a valid test.
///
/// A method without a body counts as abstract.
pub fn validate_method(method: &MethodInfo) -> Result<(), InvalidMethodReason> {
    check_signature(method)?;
    if method.is_test_action() {
        return Err(InvalidMethodReason::TestAction);
    }
    Ok(())
}

/// Validates both the method and its declaring type, returning the descriptor on success.
pub fn validate(method: &MethodRef) -> Result<TestDescriptor, InvalidReason> {
    validate_type(method.declaring_type()).map_err(InvalidReason::Type)?;
    validate_method(method.method()).map_err(InvalidReason::Method)?;
    Ok(describe(method))
}

/// Extracts the descriptor for a method without validating it.
pub fn describe(method: &MethodRef) -> TestDescriptor {
    describe_with_actions(method, Arc::new(test_actions(method.declaring_type())))
}

pub(crate) fn describe_with_actions(
    method: &MethodRef,
    actions: Arc<TestActions>,
) -> TestDescriptor {
    let info = method.method();
    let mut description = None;
    let mut groups = BTreeSet::new();
    let mut skip = None;
    for attribute in info.attributes() {
        match attribute {
            Attribute::Description(text) if description.is_none() => {
                description = Some(text.clone());
            }
            Attribute::Group(group) => {
                groups.insert(group.clone());
            }
            Attribute::Skip(reason) if skip.is_none() => {
                skip = Some(SkipMarker {
                    reason: reason.clone(),
                });
            }
            _ => {}
        }
    }

    let full_name = format!("{}.{}", method.declaring_type().full_name(), info.name());
    TestDescriptor {
        method: method.clone(),
        name: info.name().into(),
        full_name,
        description,
        groups,
        skip,
        is_pre_action: info.has_attribute(&Attribute::PreTestAction),
        is_post_action: info.has_attribute(&Attribute::PostTestAction),
        actions,
    }
}

/// Lists the pre- and post-test actions of a type, in declaration order.
///
/// Action methods that could not be invoked as instance methods are ignored.
pub fn test_actions(ty: &Arc<TypeInfo>) -> TestActions {
    let mut actions = TestActions::default();
    for (index, method) in ty.methods().iter().enumerate() {
        let is_pre = method.has_attribute(&Attribute::PreTestAction);
        let is_post = method.has_attribute(&Attribute::PostTestAction);
        if !is_pre && !is_post {
            continue;
        }
        if let Err(reason) = check_signature(method) {
            warn!(
                "ignoring test action {}.{}: {reason}",
                ty.full_name(),
                method.name()
            );
            continue;
        }
        let method_ref = MethodRef::from_index(ty, index);
        if is_pre {
            actions.pre.push(method_ref.clone());
        }
        if is_post {
            actions.post.push(method_ref);
        }
    }
    actions
}

/// Returns why a test must not be invoked, if anything rules it out before construction.
///
/// Precedence: skip marker, invalid type, invalid method, test action. Constructor failures and
/// pre-test action vetoes are determined later, while running.
pub fn pre_invocation_skip(test: &TestDescriptor) -> Option<SkipReason> {
    if let Some(marker) = test.skip_marker() {
        return Some(SkipReason::SkipTestAttributeDefined {
            message: marker.reason.clone(),
        });
    }
    if let Err(cause) = validate_type(test.method().declaring_type()) {
        return Some(SkipReason::TypeNotSupported { cause });
    }
    match validate_method(test.method().method()) {
        Ok(()) => None,
        Err(InvalidMethodReason::TestAction) => Some(SkipReason::TestActionAttributeDefined),
        Err(cause) => Some(SkipReason::MethodNotSupported { cause }),
    }
}

fn check_signature(method: &MethodInfo) -> Result<(), InvalidMethodReason> {
    if method.get_visibility() != Visibility::Public {
        return Err(InvalidMethodReason::NotPublic);
    }
    if method.is_static() {
        return Err(InvalidMethodReason::Static);
    }
    if method.is_abstract() || method.body().is_none() {
        return Err(InvalidMethodReason::Abstract);
    }
    if method.is_generic() {
        return Err(InvalidMethodReason::Generic);
    }
    if let ReturnKind::Value(type_name) = method.return_kind() {
        return Err(InvalidMethodReason::ReturnsValue {
            type_name: type_name.to_string(),
        });
    }
    match method.params() {
        [] | [ParamKind::Context] => Ok(()),
        params => Err(InvalidMethodReason::InvalidParameters {
            count: params.len(),
        }),
    }
}
