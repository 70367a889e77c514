// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{Empty, EventLog, init_tracing};
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use unitrun_runner::{
    config::TestThreads,
    errors::ExecuteError,
    fixture::Fixture,
    list::Partitioning,
    registry::{MethodRef, SuiteBuilder, TestRegistry},
    reporter::TestEventKind,
    runner::{RunState, TestExecutor},
};

fn concurrent_executor(threads: usize, partitioning: Partitioning) -> TestExecutor {
    let mut builder = TestExecutor::builder();
    builder
        .set_concurrent(true)
        .set_test_threads(TestThreads::Count(threads))
        .set_partitioning(partitioning);
    builder.build().expect("valid settings")
}

fn many_types(types: usize, tests_per_type: usize) -> TestRegistry {
    let mut registry = TestRegistry::new();
    for t in 0..types {
        let mut suite = SuiteBuilder::<Empty>::new(&format!("app.Type{t}")).default_constructor();
        for i in 0..tests_per_type {
            suite = suite.test(&format!("test_{i}"), move |_, cx| {
                thread::sleep(Duration::from_millis(((t + i) % 3) as u64));
                cx.check(i != 3 || t % 2 == 0, "odd types fail their fourth test")
            });
        }
        registry.register(suite.build());
    }
    registry
}

#[test]
fn concurrent_events_are_well_ordered() {
    init_tracing();
    let executor = concurrent_executor(4, Partitioning::ByType);
    let log = EventLog::attach(executor.events());
    executor.events().subscribe(
        unitrun_runner::reporter::EventKind::TestStarted,
        |event| match &event.kind {
            TestEventKind::TestStarted { running, .. } if *running > 4 => {
                Err(format!("{running} tests running with 4 threads").into())
            }
            _ => Ok(()),
        },
    );

    let stats = executor
        .execute_registry(&many_types(8, 5))
        .expect("run completes");

    assert_eq!(stats.initial_run_count, 40);
    assert_eq!(stats.total_outcomes(), 40);
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.passed, 36);

    let events = log.events();
    assert!(matches!(
        events.first(),
        Some(TestEventKind::RunStarted { total: 40 })
    ));
    assert!(matches!(
        events.last(),
        Some(TestEventKind::RunCompleted { .. })
    ));

    // Every test starts exactly once, then completes exactly once.
    let mut state: BTreeMap<String, u8> = BTreeMap::new();
    for event in &events[1..events.len() - 1] {
        match event {
            TestEventKind::TestStarted { test, .. } => {
                let prev = state.insert(test.full_name().to_owned(), 1);
                assert_eq!(prev, None, "{} started twice", test.full_name());
            }
            TestEventKind::TestCompleted { test, .. } => {
                let prev = state.insert(test.full_name().to_owned(), 2);
                assert_eq!(prev, Some(1), "{} completed before starting", test.full_name());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(state.len(), 40);
    assert!(state.values().all(|s| *s == 2));

    // The reported statistics only ever grow, one outcome at a time.
    let completed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            TestEventKind::TestCompleted { current_stats, .. } => {
                Some(current_stats.total_outcomes())
            }
            _ => None,
        })
        .collect();
    assert_eq!(completed, (1..=40).collect::<Vec<_>>());
}

#[derive(Default)]
struct Slot {
    used: bool,
}

impl Fixture for Slot {}

#[test]
fn per_test_partitioning_constructs_per_test() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let ty = {
        let constructed = constructed.clone();
        let mut suite = SuiteBuilder::<Slot>::new("app.PerTest").constructor(move || {
            constructed.fetch_add(1, Ordering::SeqCst);
            Slot::default()
        });
        for i in 0..6 {
            suite = suite.test(&format!("t{i}"), |fx, cx| {
                let fresh = !fx.used;
                fx.used = true;
                cx.check(fresh, "every test gets its own fixture")
            });
        }
        suite.build()
    };

    let stats = concurrent_executor(3, Partitioning::PerTest)
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.passed, 6);
    assert_eq!(constructed.load(Ordering::SeqCst), 6);

    // By-type partitioning shares one fixture per type.
    constructed.store(0, Ordering::SeqCst);
    let stats = concurrent_executor(3, Partitioning::ByType)
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!((stats.passed, stats.failed), (1, 5));
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}

#[test]
fn workers_are_named_and_off_the_calling_thread() {
    let names = Arc::new(Mutex::new(Vec::new()));
    let ty = {
        let mut suite = SuiteBuilder::<Empty>::new("app.Names").default_constructor();
        for i in 0..4 {
            let names = names.clone();
            suite = suite.test(&format!("t{i}"), move |_, _| {
                names
                    .lock()
                    .expect("lock")
                    .push(thread::current().name().map(str::to_owned));
                Ok(())
            });
        }
        suite.build()
    };

    concurrent_executor(2, Partitioning::PerTest)
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    let names = names.lock().expect("lock");
    assert_eq!(names.len(), 4);
    for name in names.iter() {
        let name = name.as_deref().unwrap_or_default();
        assert!(name.starts_with("unitrun-worker-"), "ran on {name:?}");
    }
}

#[test]
fn overlapping_concurrent_run_is_rejected() {
    let executor = concurrent_executor(2, Partitioning::PerTest);
    let rejected = Arc::new(AtomicUsize::new(0));
    let ty = {
        let mut suite = SuiteBuilder::<Empty>::new("app.Overlap").default_constructor();
        for i in 0..4 {
            let executor = executor.clone();
            let rejected = rejected.clone();
            suite = suite.test(&format!("t{i}"), move |_, _| {
                if let Err(ExecuteError::RunInProgress) = executor.execute(Vec::new()) {
                    rejected.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            });
        }
        suite.build()
    };

    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.passed, 4);
    assert_eq!(rejected.load(Ordering::SeqCst), 4);
}

#[test]
fn begin_execute_runs_in_background() {
    let executor = concurrent_executor(2, Partitioning::ByType);
    let barrier = Arc::new(Barrier::new(2));
    let ty = {
        let barrier = barrier.clone();
        SuiteBuilder::<Empty>::new("app.Background")
            .default_constructor()
            .test("waits", move |_, _| {
                barrier.wait();
                Ok(())
            })
            .test("follows", |_, _| Ok(()))
            .build()
    };
    let log = EventLog::attach(executor.events());

    let handle = executor
        .begin_execute(MethodRef::tests_of(&ty))
        .expect("run starts");
    assert_ne!(executor.run_state(), RunState::Idle);
    assert!(matches!(
        executor.begin_execute(MethodRef::tests_of(&ty)),
        Err(ExecuteError::RunInProgress)
    ));
    assert!(matches!(
        executor.set_partitioning(Partitioning::PerTest),
        Err(ExecuteError::SettingsLocked { .. })
    ));

    barrier.wait();
    let stats = handle.join().expect("run completes");
    assert_eq!(stats.passed, 2);
    assert_eq!(executor.run_state(), RunState::Idle);
    assert_eq!(log.final_stats(), Some(stats));
}
