// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{Empty, EventLog, init_tracing};
use pretty_assertions::assert_eq;
use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use unitrun_metadata::{CancelReason, OutcomeKind, RunStats, SkipReason};
use unitrun_runner::{
    errors::{ExecuteError, HookError},
    fixture::{Fixture, TestContext, TestResult, TestSignal},
    registry::{MethodRef, SuiteBuilder, TestRegistry},
    runner::{RunState, TestExecutor},
    test_filter::GroupFilter,
};

fn mixed_suite() -> TestRegistry {
    let ty = SuiteBuilder::<Empty>::new("app.Mixed")
        .default_constructor()
        .test("passes", |_, _| Ok(()))
        .test("fails", |_, cx| cx.check(1 + 1 == 3, "1 + 1 == 3"))
        .test("throws", |_, _| Err(io::Error::other("disk on fire").into()))
        .test("panics", |_, _| panic!("unexpected state"))
        .test("aborts", |_, cx| Err(cx.abort("stop")))
        .test_with("skipped", |_, _| Ok(()), |m| m.skip(Some("flaky")))
        .build();
    let mut registry = TestRegistry::new();
    registry.register(ty);
    registry
}

#[test]
fn counters_sum_to_total() {
    init_tracing();
    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());

    let stats = executor
        .execute_registry(&mixed_suite())
        .expect("run completes");

    assert_eq!(stats.initial_run_count, 6);
    assert_eq!(stats.total_outcomes(), stats.initial_run_count);
    assert_eq!(
        (
            stats.passed,
            stats.failed,
            stats.threw,
            stats.skipped,
            stats.aborted
        ),
        (1, 1, 2, 1, 1)
    );
    assert!(!stats.is_success());
    assert_eq!(log.run_started_total(), Some(6));
    assert_eq!(log.final_stats(), Some(stats));
    assert_eq!(executor.current_stats(), stats);
    assert_eq!(executor.run_state(), RunState::Idle);

    assert_eq!(
        log.results(),
        vec![
            ("passes".to_owned(), Ok(OutcomeKind::Passed)),
            ("fails".to_owned(), Ok(OutcomeKind::Failed)),
            ("throws".to_owned(), Ok(OutcomeKind::Threw)),
            ("panics".to_owned(), Ok(OutcomeKind::Threw)),
            ("aborts".to_owned(), Ok(OutcomeKind::Aborted)),
            (
                "skipped".to_owned(),
                Err(SkipReason::SkipTestAttributeDefined {
                    message: Some("flaky".to_owned())
                })
            ),
        ]
    );
}

#[test]
fn single_passing_test() {
    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let ty = SuiteBuilder::<Empty>::new("app.One")
        .default_constructor()
        .test("works", |_, _| Ok(()))
        .build();

    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert!(stats.is_success());
    assert_eq!(
        log.lines(),
        vec![
            "run started: 1",
            "started: works",
            "completed: works PASS",
            "run completed: 1",
        ]
    );
}

#[test]
fn empty_run() {
    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());

    let stats = executor.execute(Vec::new()).expect("run completes");
    assert_eq!(stats, RunStats::new(0));
    assert_eq!(log.lines(), vec!["run started: 0", "run completed: 0"]);
}

#[test]
fn abort_is_not_a_failure() {
    let executor = TestExecutor::new();
    let ty = SuiteBuilder::<Empty>::new("app.Abort")
        .default_constructor()
        .test("stops", |_, cx| Err(cx.abort("stop")))
        .build();
    let log = EventLog::attach(executor.events());

    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.aborted, 1);
    assert!(stats.is_success());
    assert_eq!(log.lines()[2], "completed: stops ABORT");
}

#[test]
fn skip_marker_prevents_invocation() {
    let invoked = Arc::new(AtomicBool::new(false));
    let ty = {
        let invoked = invoked.clone();
        SuiteBuilder::<Empty>::new("app.Skip")
            .default_constructor()
            .test_with(
                "ignored",
                move |_, _| {
                    invoked.store(true, Ordering::SeqCst);
                    Ok(())
                },
                |m| m.skip(None),
            )
            .build()
    };

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");

    assert!(!invoked.load(Ordering::SeqCst));
    assert_eq!(stats.skipped, 1);
    assert_eq!(
        log.results(),
        vec![(
            "ignored".to_owned(),
            Err(SkipReason::SkipTestAttributeDefined { message: None })
        )]
    );
}

#[test]
fn constructor_failure_skips_each_method() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let ty = {
        let attempts = attempts.clone();
        SuiteBuilder::<Empty>::new("app.NoDatabase")
            .try_constructor(move || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<Empty, _>(io::Error::other("no database"))
            })
            .test("first", |_, _| Ok(()))
            .test("second", |_, _| Ok(()))
            .test("third", |_, _| Ok(()))
            .build()
    };

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");

    assert_eq!(stats.skipped, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "one attempt per method");
    let results = log.results();
    assert_eq!(results.len(), 3);
    for (_, result) in results {
        match result {
            Err(SkipReason::ConstructorThrewException { error }) => {
                assert_eq!(error.message, "no database");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[test]
fn constructor_retried_only_while_no_instance_is_live() {
    // The first construction of app.Flaky fails, later ones succeed.
    let flaky_attempts = Arc::new(AtomicUsize::new(0));
    let flaky = {
        let attempts = flaky_attempts.clone();
        SuiteBuilder::<Empty>::new("app.Flaky")
            .try_constructor(move || match attempts.fetch_add(1, Ordering::SeqCst) {
                0 => Err(io::Error::other("warming up")),
                _ => Ok(Empty),
            })
            .test("first", |_, _| Ok(()))
            .test("second", |_, _| Ok(()))
            .test("third", |_, _| Ok(()))
            .build()
    };
    let steady_attempts = Arc::new(AtomicUsize::new(0));
    let steady = {
        let attempts = steady_attempts.clone();
        SuiteBuilder::<Empty>::new("app.Steady")
            .constructor(move || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Empty
            })
            .test("only", |_, _| Ok(()))
            .build()
    };

    // Interleave the two types; the run groups them by declaring type.
    let mut flaky_tests = MethodRef::tests_of(&flaky);
    let mut methods: Vec<_> = flaky_tests.by_ref().take(1).collect();
    methods.extend(MethodRef::tests_of(&steady));
    methods.extend(flaky_tests);

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let stats = executor.execute(methods).expect("run completes");

    assert_eq!((stats.passed, stats.skipped), (3, 1));
    let results = log.results();
    match &results[0] {
        (name, Err(SkipReason::ConstructorThrewException { error })) => {
            assert_eq!(name, "first");
            assert_eq!(error.message, "warming up");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(
        results[1..].to_vec(),
        vec![
            ("second".to_owned(), Ok(OutcomeKind::Passed)),
            ("third".to_owned(), Ok(OutcomeKind::Passed)),
            ("only".to_owned(), Ok(OutcomeKind::Passed)),
        ]
    );
    // One failed attempt for "first", one successful construction shared by the rest.
    assert_eq!(flaky_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(steady_attempts.load(Ordering::SeqCst), 1);
}

struct Counting {
    seen: usize,
    teardowns: Arc<AtomicUsize>,
}

impl Fixture for Counting {
    fn teardown(&mut self) -> Result<(), HookError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn fixture_is_shared_within_a_type() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let teardowns = Arc::new(AtomicUsize::new(0));
    let ty = {
        let constructed = constructed.clone();
        let teardowns = teardowns.clone();
        SuiteBuilder::<Counting>::new("app.Counting")
            .constructor(move || {
                constructed.fetch_add(1, Ordering::SeqCst);
                Counting {
                    seen: 0,
                    teardowns: teardowns.clone(),
                }
            })
            .test("first", |fx, cx| {
                fx.seen += 1;
                cx.check(fx.seen == 1, "first test sees a fresh fixture")
            })
            .test("second", |fx, cx| {
                fx.seen += 1;
                cx.check(fx.seen == 2, "second test sees the same fixture")
            })
            .build()
    };

    let stats = TestExecutor::new()
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.passed, 2);
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_actions_wrap_each_test() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let push = |order: &Arc<Mutex<Vec<String>>>, entry: &'static str| {
        let order = order.clone();
        move |_: &mut Empty, cx: &mut TestContext| -> TestResult {
            order
                .lock()
                .expect("lock")
                .push(format!("{entry} {}", cx.name()));
            Ok(())
        }
    };
    let ty = SuiteBuilder::<Empty>::new("app.Actions")
        .default_constructor()
        .pre_test_action("setup", push(&order, "pre"))
        .post_test_action("cleanup", push(&order, "post"))
        .test("a", push(&order, "body"))
        .test("b", push(&order, "body"))
        .build();

    let stats = TestExecutor::new()
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.passed, 2);
    assert_eq!(
        *order.lock().expect("lock"),
        vec!["pre a", "body a", "post a", "pre b", "body b", "post b"]
    );
}

#[test]
fn pre_action_veto_skips_test() {
    let ty = SuiteBuilder::<Empty>::new("app.Veto")
        .default_constructor()
        .pre_test_action("gate", |_, cx| {
            if cx.in_group("slow") {
                Err(TestSignal::skip("slow tests disabled"))
            } else {
                Ok(())
            }
        })
        .test_with("slow", |_, _| Ok(()), |m| m.group("slow"))
        .test("quick", |_, _| Ok(()))
        .build();

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(
        log.results(),
        vec![
            (
                "slow".to_owned(),
                Err(SkipReason::VetoedByPreAction {
                    message: Some("slow tests disabled".to_owned())
                })
            ),
            ("quick".to_owned(), Ok(OutcomeKind::Passed)),
        ]
    );
}

#[test]
fn group_filter_selects_before_run_started() {
    let ty = SuiteBuilder::<Empty>::new("app.Groups")
        .default_constructor()
        .test_with("fast_one", |_, _| Ok(()), |m| m.group("fast"))
        .test_with("slow_one", |_, _| Ok(()), |m| m.group("slow"))
        .test_with("both", |_, _| Ok(()), |m| m.group("fast").group("slow"))
        .test("none", |_, _| Ok(()))
        .build();

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let filter = GroupFilter::new(["fast"]).expect("valid group");
    let stats = executor
        .execute_with_groups(MethodRef::tests_of(&ty), &filter)
        .expect("run completes");

    assert_eq!(stats.initial_run_count, 2);
    assert_eq!(log.run_started_total(), Some(2));
    let names: Vec<_> = log.results().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["fast_one", "both"]);

    // The executor-wide filter applies when a run does not pass one.
    executor
        .set_groups(GroupFilter::new(["slow"]).expect("valid group"))
        .expect("executor is idle");
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.initial_run_count, 2);
}

#[test]
fn sort_by_name_orders_within_type() {
    let ty = SuiteBuilder::<Empty>::new("app.Sorted")
        .default_constructor()
        .test("charlie", |_, _| Ok(()))
        .test("alpha", |_, _| Ok(()))
        .test("bravo", |_, _| Ok(()))
        .build();

    let executor = TestExecutor::new();
    executor.set_sort_by_name(true).expect("executor is idle");
    let log = EventLog::attach(executor.events());
    executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    let names: Vec<_> = log.results().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
}

#[test]
fn overlapping_run_is_rejected() {
    let executor = TestExecutor::new();
    let nested = Arc::new(Mutex::new(None));
    let inner = SuiteBuilder::<Empty>::new("app.Inner")
        .default_constructor()
        .test("inner", |_, _| Ok(()))
        .build();
    let outer = {
        let executor = executor.clone();
        let nested = nested.clone();
        SuiteBuilder::<Empty>::new("app.Outer")
            .default_constructor()
            .test("reenter", move |_, _| {
                let result = executor.execute(MethodRef::tests_of(&inner));
                *nested.lock().expect("lock") = Some(result);
                Ok(())
            })
            .build()
    };

    let stats = executor
        .execute(MethodRef::tests_of(&outer))
        .expect("outer run completes");
    assert_eq!(stats.passed, 1);
    assert!(matches!(
        nested.lock().expect("lock").take(),
        Some(Err(ExecuteError::RunInProgress))
    ));

    // Once the outer run finishes, the executor accepts new runs.
    let stats = executor
        .execute(MethodRef::tests_of(&outer))
        .expect("second run completes");
    assert_eq!(stats.passed, 1);
}

#[test]
fn cancellation_skips_remaining_tests() {
    let ty = SuiteBuilder::<Empty>::new("app.Cancel")
        .default_constructor()
        .test("first", |_, cx| {
            cx.cancel_handle().cancel();
            Ok(())
        })
        .test("second", |_, _| Ok(()))
        .test("third", |_, _| Ok(()))
        .build();

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("cancellation is not an error");

    assert_eq!(stats.passed, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.cancel_reason, Some(CancelReason::Requested));
    assert!(!stats.is_success());
    assert_eq!(
        log.results()[1..].to_vec(),
        vec![
            ("second".to_owned(), Err(SkipReason::Cancelled)),
            ("third".to_owned(), Err(SkipReason::Cancelled)),
        ]
    );

    // Cancellation does not carry over to the next run.
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.passed, 1);
}

#[test]
fn invalid_methods_are_reported_as_skipped() {
    use unitrun_metadata::InvalidMethodReason;
    use unitrun_runner::registry::{MethodInfo, Visibility};

    let ty = SuiteBuilder::<Empty>::new("app.Invalid")
        .default_constructor()
        .method(
            MethodInfo::with_body("private", |_: &mut Empty, _| Ok(()))
                .visibility(Visibility::Private)
                .test(),
        )
        .test("valid", |_, _| Ok(()))
        .build();

    let executor = TestExecutor::new();
    let log = EventLog::attach(executor.events());
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!((stats.passed, stats.skipped), (1, 1));
    assert_eq!(
        log.results()[0],
        (
            "private".to_owned(),
            Err(SkipReason::MethodNotSupported {
                cause: InvalidMethodReason::NotPublic
            })
        )
    );
}

#[test]
fn settings_validation() {
    let executor = TestExecutor::new();
    assert!(matches!(
        executor.set_test_threads(0),
        Err(ExecuteError::InvalidArgument {
            name: "test-threads",
            ..
        })
    ));
    executor.set_test_threads(3).expect("valid thread count");
    assert_eq!(executor.settings().test_threads(), 3);
}
