// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running individual tests: skip classification, fixture resolution, test actions, the body and
//! outcome classification.

use super::internal_events::InternalTestEvent;
use crate::{
    fixture::{CancelHandle, Fixture, TestContext, TestResult, TestSignal},
    helpers::catch_panic,
    inspect,
    instance::InstanceSlot,
    list::TestDescriptor,
    registry::MethodRef,
    stopwatch::stopwatch,
};
use chrono::{DateTime, FixedOffset, Local};
use std::{sync::Arc, time::Duration};
use tracing::{debug, trace};
use unitrun_metadata::{ErrorInfo, SkipReason, TestOutcome};

/// Runs tests and reports what happens through internal events.
#[derive(Clone, Debug)]
pub(super) struct TestInvoker {
    post_actions_after_veto: bool,
    cancel: CancelHandle,
}

enum Invocation {
    Skipped(SkipReason),
    Completed {
        outcome: TestOutcome,
        start_time: DateTime<FixedOffset>,
        time_taken: Duration,
    },
}

enum PreActions {
    Proceed,
    Vetoed(Option<String>),
    Failed(TestOutcome),
}

impl TestInvoker {
    pub(super) fn new(post_actions_after_veto: bool, cancel: CancelHandle) -> Self {
        Self {
            post_actions_after_veto,
            cancel,
        }
    }

    /// Runs a unit of work with one fixture slot, releasing the slot at the end.
    ///
    /// Each test produces `Started` followed by exactly one of `Finished` or `Skipped`.
    pub(super) fn run_unit<'a>(
        &self,
        tests: impl IntoIterator<Item = &'a Arc<TestDescriptor>>,
        slot: &mut InstanceSlot,
        mut send: impl FnMut(InternalTestEvent),
    ) {
        for test in tests {
            send(InternalTestEvent::Started { test: test.clone() });

            if self.cancel.is_cancelled() {
                send(InternalTestEvent::Skipped {
                    test: test.clone(),
                    reason: SkipReason::Cancelled,
                });
                continue;
            }

            trace!("running {}", test.full_name());
            match self.invoke(test, slot) {
                Invocation::Skipped(reason) => {
                    trace!("{} skipped: {reason}", test.full_name());
                    send(InternalTestEvent::Skipped {
                        test: test.clone(),
                        reason,
                    });
                }
                Invocation::Completed {
                    outcome,
                    start_time,
                    time_taken,
                } => {
                    trace!("{} finished: {}", test.full_name(), outcome.kind());
                    send(InternalTestEvent::Finished {
                        test: test.clone(),
                        outcome,
                        start_time,
                        time_taken,
                    });
                }
            }
        }
        slot.release();
    }

    fn invoke(&self, test: &Arc<TestDescriptor>, slot: &mut InstanceSlot) -> Invocation {
        if let Some(reason) = inspect::pre_invocation_skip(test) {
            return Invocation::Skipped(reason);
        }
        let fixture = match slot.get_or_create(test.declaring_type()) {
            Ok(fixture) => fixture,
            Err(reason) => return Invocation::Skipped(reason),
        };
        let mut cx = TestContext::new(test.clone(), self.cancel.clone());

        let (mut outcome, start_time, time_taken) = match run_pre_actions(test, fixture, &mut cx) {
            PreActions::Proceed => {
                let stopwatch = stopwatch();
                let result = call(test.method(), fixture, &mut cx);
                let snapshot = stopwatch.snapshot();
                (classify(result), snapshot.start_time, snapshot.duration)
            }
            PreActions::Vetoed(message) => {
                if self.post_actions_after_veto {
                    for action in test.actions().post() {
                        if let Err(signal) = call(action, fixture, &mut cx) {
                            debug!(
                                "ignoring post-test action {} failure after veto: {signal}",
                                action.method().name()
                            );
                        }
                    }
                }
                return Invocation::Skipped(SkipReason::VetoedByPreAction { message });
            }
            PreActions::Failed(outcome) => (outcome, Local::now().fixed_offset(), Duration::ZERO),
        };

        for action in test.actions().post() {
            if let Err(signal) = call(action, fixture, &mut cx) {
                if outcome == TestOutcome::Passed {
                    outcome = classify(Err(signal));
                } else {
                    debug!(
                        "post-test action {} failed after a non-passing outcome: {signal}",
                        action.method().name()
                    );
                }
            }
        }

        Invocation::Completed {
            outcome,
            start_time,
            time_taken,
        }
    }
}

fn run_pre_actions(
    test: &TestDescriptor,
    fixture: &mut dyn Fixture,
    cx: &mut TestContext,
) -> PreActions {
    for action in test.actions().pre() {
        match call(action, fixture, cx) {
            Ok(()) => {}
            Err(TestSignal::Skip { message }) => return PreActions::Vetoed(message),
            Err(signal) => return PreActions::Failed(classify(Err(signal))),
        }
    }
    PreActions::Proceed
}

/// Calls a method body on the fixture, converting panics into errors.
fn call(method: &MethodRef, fixture: &mut dyn Fixture, cx: &mut TestContext) -> TestResult {
    let Some(body) = method.method().body() else {
        return Err(TestSignal::Error(ErrorInfo::new(
            "unitrun::MissingBody",
            format!("method {method:?} has no body"),
        )));
    };
    catch_panic(|| body(fixture, cx)).unwrap_or_else(|info| Err(TestSignal::Error(info)))
}

fn classify(result: TestResult) -> TestOutcome {
    match result {
        Ok(()) => TestOutcome::Passed,
        Err(TestSignal::Fail { assertion, message }) => TestOutcome::Failed { assertion, message },
        // Skipping is only meaningful from a pre-test action; elsewhere it stops the test.
        Err(TestSignal::Abort { message } | TestSignal::Skip { message }) => {
            TestOutcome::Aborted { message }
        }
        Err(TestSignal::Error(error)) => TestOutcome::Threw { error },
    }
}
