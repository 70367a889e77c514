// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fixture slot: at most one live fixture, reused across consecutive tests of one type.

use crate::{
    errors::DisplayErrorChain,
    fixture::Fixture,
    helpers::catch_panic,
    registry::TypeInfo,
};
use std::sync::Arc;
use tracing::{debug, trace};
use unitrun_metadata::{ErrorInfo, SkipReason};

struct LiveInstance {
    ty: Arc<TypeInfo>,
    fixture: Box<dyn Fixture>,
}

/// Holds the fixture for the tests a single worker runs.
///
/// Slots are never shared between threads. Dropping a slot tears down its fixture.
#[derive(Default)]
pub(crate) struct InstanceSlot {
    current: Option<LiveInstance>,
}

impl InstanceSlot {
    /// Returns the fixture for `ty`, constructing it if the slot is empty or holds a fixture of a
    /// different type.
    ///
    /// A constructor that fails or panics leaves the slot empty, so the next test of the same type
    /// attempts construction again.
    pub(crate) fn get_or_create(
        &mut self,
        ty: &Arc<TypeInfo>,
    ) -> Result<&mut dyn Fixture, SkipReason> {
        let reuse = self
            .current
            .as_ref()
            .is_some_and(|live| Arc::ptr_eq(&live.ty, ty));
        if !reuse {
            self.release();
            let fixture = construct(ty)
                .map_err(|error| SkipReason::ConstructorThrewException { error })?;
            self.current = Some(LiveInstance {
                ty: ty.clone(),
                fixture,
            });
        }

        match &mut self.current {
            Some(live) => Ok(live.fixture.as_mut()),
            None => unreachable!("slot was populated above"),
        }
    }

    /// Tears down and drops the live fixture, if any.
    pub(crate) fn release(&mut self) {
        if let Some(mut live) = self.current.take() {
            let type_name = live.ty.full_name();
            match catch_panic(|| live.fixture.teardown()) {
                Ok(Ok(())) => trace!("tore down fixture {type_name}"),
                Ok(Err(error)) => debug!(
                    "ignoring teardown error for {type_name}: {}",
                    DisplayErrorChain::new(&*error)
                ),
                Err(info) => debug!("ignoring teardown panic for {type_name}: {info}"),
            }
        }
    }
}

impl Drop for InstanceSlot {
    fn drop(&mut self) {
        self.release();
    }
}

fn construct(ty: &TypeInfo) -> Result<Box<dyn Fixture>, ErrorInfo> {
    let Some(ctor) = ty.get_constructor() else {
        return Err(ErrorInfo::new(
            "unitrun::MissingConstructor",
            format!("type {} has no constructor", ty.full_name()),
        ));
    };
    trace!("constructing fixture {}", ty.full_name());
    let factory = ctor.factory();
    catch_panic(|| factory()).and_then(|result| result)
}
