// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{executor::TestInvoker, internal_events::InternalTestEvent};
use crate::{
    config::{RunnerProfile, TestThreads},
    dispatch::DispatchPolicy,
    errors::{DispatchError, DisplayErrorChain, ExecuteError},
    fixture::CancelHandle,
    instance::InstanceSlot,
    list::{Partitioning, TestList},
    registry::{MethodRef, TestRegistry},
    reporter::{EventBus, TestEvent, TestEventKind},
    stopwatch::{StopwatchStart, stopwatch},
    test_filter::GroupFilter,
};
use chrono::Local;
use rayon::ThreadPoolBuilder;
use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};
use tracing::debug;
use unitrun_metadata::{CancelReason, ErrorInfo, OutcomeKind, RunStats, RunSummary, SkipReason};

/// The state of a [`TestExecutor`].
///
/// `Idle -> Preparing -> Running -> Completed -> Idle`. Only one run may be active at a time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    /// No run is active.
    Idle,
    /// A run is selecting its tests.
    Preparing,
    /// A run is executing tests.
    Running,
    /// A run has raised its completion event and is about to return to idle.
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Preparing => write!(f, "preparing"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Settings that apply to the next run of a [`TestExecutor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSettings {
    concurrent: bool,
    test_threads: usize,
    partitioning: Partitioning,
    sort_by_name: bool,
    marshal_events: bool,
    post_actions_after_veto: bool,
    groups: GroupFilter,
}

impl RunSettings {
    /// Whether tests run on a pool of worker threads.
    pub fn concurrent(&self) -> bool {
        self.concurrent
    }

    /// The maximum number of worker threads for concurrent runs.
    pub fn test_threads(&self) -> usize {
        self.test_threads
    }

    /// How tests are split into units of work.
    pub fn partitioning(&self) -> Partitioning {
        self.partitioning
    }

    /// Whether tests are ordered by name within a declaring type.
    pub fn sort_by_name(&self) -> bool {
        self.sort_by_name
    }

    /// Whether events are marshaled onto the dispatch queue of the thread starting the run.
    pub fn marshal_events(&self) -> bool {
        self.marshal_events
    }

    /// Whether post-test actions run after a pre-test action vetoed the test.
    pub fn post_actions_after_veto(&self) -> bool {
        self.post_actions_after_veto
    }

    /// The group filter used when a run does not supply one.
    pub fn groups(&self) -> &GroupFilter {
        &self.groups
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrent: false,
            test_threads: TestThreads::NumCpus.compute(),
            partitioning: Partitioning::ByType,
            sort_by_name: false,
            marshal_events: false,
            post_actions_after_veto: false,
            groups: GroupFilter::all(),
        }
    }
}

/// Builds a [`TestExecutor`].
#[derive(Debug, Default)]
pub struct ExecutorBuilder {
    concurrent: bool,
    test_threads: Option<TestThreads>,
    partitioning: Partitioning,
    sort_by_name: bool,
    marshal_events: bool,
    post_actions_after_veto: bool,
    groups: GroupFilter,
}

impl ExecutorBuilder {
    /// Sets whether tests run on a pool of worker threads.
    pub fn set_concurrent(&mut self, concurrent: bool) -> &mut Self {
        self.concurrent = concurrent;
        self
    }

    /// Sets the number of worker threads for concurrent runs.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets how tests are split into units of work.
    pub fn set_partitioning(&mut self, partitioning: Partitioning) -> &mut Self {
        self.partitioning = partitioning;
        self
    }

    /// Sets whether tests are ordered by name within a declaring type.
    pub fn set_sort_by_name(&mut self, sort_by_name: bool) -> &mut Self {
        self.sort_by_name = sort_by_name;
        self
    }

    /// Sets whether events are marshaled onto the dispatch queue of the thread starting the run.
    pub fn set_marshal_events(&mut self, marshal_events: bool) -> &mut Self {
        self.marshal_events = marshal_events;
        self
    }

    /// Sets whether post-test actions run after a pre-test action vetoed the test.
    pub fn set_post_actions_after_veto(&mut self, value: bool) -> &mut Self {
        self.post_actions_after_veto = value;
        self
    }

    /// Sets the default group filter.
    pub fn set_groups(&mut self, groups: GroupFilter) -> &mut Self {
        self.groups = groups;
        self
    }

    /// Applies every setting from a configuration profile.
    pub fn apply_profile(
        &mut self,
        profile: &RunnerProfile<'_>,
    ) -> Result<&mut Self, ExecuteError> {
        let groups = GroupFilter::new(profile.groups())
            .map_err(|err| ExecuteError::invalid_argument("groups", err.to_string()))?;
        self.concurrent = profile.concurrent();
        self.test_threads = Some(profile.test_threads());
        self.partitioning = profile.partitioning();
        self.sort_by_name = profile.sort_by_name();
        self.marshal_events = profile.marshal_events();
        self.post_actions_after_veto = profile.post_actions_after_veto();
        self.groups = groups;
        Ok(self)
    }

    /// Creates the executor.
    pub fn build(self) -> Result<TestExecutor, ExecuteError> {
        let test_threads = self.test_threads.unwrap_or(TestThreads::NumCpus).compute();
        if test_threads == 0 {
            return Err(ExecuteError::invalid_argument("test-threads", "must be at least 1"));
        }
        Ok(TestExecutor::with_settings(RunSettings {
            concurrent: self.concurrent,
            test_threads,
            partitioning: self.partitioning,
            sort_by_name: self.sort_by_name,
            marshal_events: self.marshal_events,
            post_actions_after_veto: self.post_actions_after_veto,
            groups: self.groups,
        }))
    }
}

/// Discovers, runs and reports tests.
///
/// Cloning an executor yields another handle to the same executor: the run state, the settings
/// and the event bus are shared.
#[derive(Clone, Default)]
pub struct TestExecutor {
    inner: Arc<ExecutorInner>,
}

#[derive(Default)]
struct ExecutorInner {
    // The state lock.
    state: Mutex<StateCell>,
    // The stats lock. Only the coordinator of the active run writes to it.
    stats: Mutex<RunStats>,
    cancel: Arc<AtomicBool>,
    bus: Arc<EventBus>,
}

#[derive(Debug)]
struct StateCell {
    state: RunState,
    settings: RunSettings,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            settings: RunSettings::default(),
        }
    }
}

impl ExecutorInner {
    fn state_lock(&self) -> MutexGuard<'_, StateCell> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_lock(&self) -> MutexGuard<'_, RunStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        self.state_lock().state = state;
    }
}

impl TestExecutor {
    /// Creates an executor with default settings: sequential, one fixture slot for the run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a builder for an executor.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    fn with_settings(settings: RunSettings) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                state: Mutex::new(StateCell {
                    state: RunState::Idle,
                    settings,
                }),
                ..ExecutorInner::default()
            }),
        }
    }

    /// The event bus lifecycle events are raised on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// The current run state.
    pub fn run_state(&self) -> RunState {
        self.inner.state_lock().state
    }

    /// Returns true while a run is preparing or running.
    pub fn is_running(&self) -> bool {
        !matches!(self.run_state(), RunState::Idle)
    }

    /// Statistics for the active run, or for the last run if none is active.
    pub fn current_stats(&self) -> RunStats {
        *self.inner.stats_lock()
    }

    /// A snapshot of the current settings.
    pub fn settings(&self) -> RunSettings {
        self.inner.state_lock().settings.clone()
    }

    /// Sets whether tests run on a pool of worker threads.
    pub fn set_concurrent(&self, concurrent: bool) -> Result<(), ExecuteError> {
        self.update_settings("concurrent", |s| s.concurrent = concurrent)
    }

    /// Sets the maximum number of worker threads for concurrent runs.
    pub fn set_test_threads(&self, test_threads: usize) -> Result<(), ExecuteError> {
        if test_threads == 0 {
            return Err(ExecuteError::invalid_argument("test-threads", "must be at least 1"));
        }
        self.update_settings("test-threads", |s| s.test_threads = test_threads)
    }

    /// Sets how tests are split into units of work.
    pub fn set_partitioning(&self, partitioning: Partitioning) -> Result<(), ExecuteError> {
        self.update_settings("partitioning", |s| s.partitioning = partitioning)
    }

    /// Sets whether tests are ordered by name within a declaring type.
    pub fn set_sort_by_name(&self, sort_by_name: bool) -> Result<(), ExecuteError> {
        self.update_settings("sort-by-name", |s| s.sort_by_name = sort_by_name)
    }

    /// Sets whether events are marshaled onto the dispatch queue of the thread starting the run.
    pub fn set_marshal_events(&self, marshal_events: bool) -> Result<(), ExecuteError> {
        self.update_settings("marshal-events", |s| s.marshal_events = marshal_events)
    }

    /// Sets whether post-test actions still run after a pre-test action vetoes a test.
    pub fn set_post_actions_after_veto(&self, value: bool) -> Result<(), ExecuteError> {
        self.update_settings("post-actions-after-veto", |s| {
            s.post_actions_after_veto = value
        })
    }

    /// Sets the group filter used when a run does not supply one.
    pub fn set_groups(&self, groups: GroupFilter) -> Result<(), ExecuteError> {
        self.update_settings("groups", |s| s.groups = groups)
    }

    fn update_settings(
        &self,
        setting: &'static str,
        f: impl FnOnce(&mut RunSettings),
    ) -> Result<(), ExecuteError> {
        let mut cell = self.inner.state_lock();
        if cell.state != RunState::Idle {
            return Err(ExecuteError::SettingsLocked { setting });
        }
        f(&mut cell.settings);
        Ok(())
    }

    /// Requests cancellation of the active run. Tests that have not started yet are skipped.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }

    /// Returns a handle that can cancel the active run from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.inner.cancel.clone())
    }

    /// Runs every candidate test of the registry.
    pub fn execute_registry(&self, registry: &TestRegistry) -> Result<RunStats, ExecuteError> {
        self.execute(registry.candidates())
    }

    /// Runs the given methods, filtered by the configured groups, and blocks until the run
    /// completes.
    ///
    /// Fails immediately with [`ExecuteError::RunInProgress`] if another run is active.
    pub fn execute(
        &self,
        methods: impl IntoIterator<Item = MethodRef>,
    ) -> Result<RunStats, ExecuteError> {
        self.prepare(methods, None)?.run()
    }

    /// Runs the given methods filtered by `groups`, and blocks until the run completes.
    pub fn execute_with_groups(
        &self,
        methods: impl IntoIterator<Item = MethodRef>,
        groups: &GroupFilter,
    ) -> Result<RunStats, ExecuteError> {
        self.prepare(methods, Some(groups))?.run()
    }

    /// Starts running the given methods on a background thread.
    ///
    /// Test selection happens before this returns, so [`ExecuteError::RunInProgress`] is reported
    /// immediately. Errors during the run are reported by [`RunHandle::join`].
    pub fn begin_execute(
        &self,
        methods: impl IntoIterator<Item = MethodRef>,
    ) -> Result<RunHandle, ExecuteError> {
        self.begin(methods, None)
    }

    /// Like [`begin_execute`](Self::begin_execute), filtered by `groups`.
    pub fn begin_execute_with_groups(
        &self,
        methods: impl IntoIterator<Item = MethodRef>,
        groups: &GroupFilter,
    ) -> Result<RunHandle, ExecuteError> {
        self.begin(methods, Some(groups))
    }

    fn begin(
        &self,
        methods: impl IntoIterator<Item = MethodRef>,
        groups: Option<&GroupFilter>,
    ) -> Result<RunHandle, ExecuteError> {
        let prepared = self.prepare(methods, groups)?;
        // If spawning fails the closure is dropped, which returns the executor to idle.
        let join_handle = thread::Builder::new()
            .name("unitrun-run".to_owned())
            .spawn(move || prepared.run())
            .map_err(ExecuteError::SpawnRun)?;
        Ok(RunHandle { join_handle })
    }

    fn prepare(
        &self,
        methods: impl IntoIterator<Item = MethodRef>,
        groups: Option<&GroupFilter>,
    ) -> Result<PreparedRun, ExecuteError> {
        let settings = {
            let mut cell = self.inner.state_lock();
            if cell.state != RunState::Idle {
                return Err(ExecuteError::RunInProgress);
            }
            cell.state = RunState::Preparing;
            cell.settings.clone()
        };
        let guard = RunGuard {
            inner: self.inner.clone(),
        };

        let stopwatch = stopwatch();
        self.inner.cancel.store(false, Ordering::SeqCst);
        let dispatch = DispatchPolicy::capture(settings.marshal_events);

        let filter = groups.unwrap_or(&settings.groups);
        let list = TestList::new(methods, filter, settings.sort_by_name);
        *self.inner.stats_lock() = RunStats::new(list.test_count());
        debug!(
            "prepared test run: {} tests in {} types",
            list.test_count(),
            list.groups().len()
        );

        Ok(PreparedRun {
            guard,
            settings,
            list,
            dispatch,
            stopwatch,
        })
    }
}

impl fmt::Debug for TestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.state_lock();
        f.debug_struct("TestExecutor")
            .field("state", &cell.state)
            .field("settings", &cell.settings)
            .field("events", &self.inner.bus)
            .finish()
    }
}

/// A run started by [`TestExecutor::begin_execute`].
#[derive(Debug)]
pub struct RunHandle {
    join_handle: thread::JoinHandle<Result<RunStats, ExecuteError>>,
}

impl RunHandle {
    /// Returns true once the run has completed.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Waits for the run to complete and returns its result.
    ///
    /// If events are marshaled onto this thread's dispatch queue, use
    /// [`DispatchQueue::join`](crate::dispatch::DispatchQueue::join) instead, which keeps the
    /// queue pumped while waiting.
    pub fn join(self) -> Result<RunStats, ExecuteError> {
        match self.join_handle.join() {
            Ok(result) => result,
            Err(payload) => Err(ExecuteError::RunPanicked(ErrorInfo::from_panic(&*payload))),
        }
    }
}

/// Returns the executor to idle when the run ends, however it ends.
struct RunGuard {
    inner: Arc<ExecutorInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.cancel.store(false, Ordering::SeqCst);
        self.inner.set_state(RunState::Idle);
    }
}

struct PreparedRun {
    guard: RunGuard,
    settings: RunSettings,
    list: TestList,
    dispatch: Result<DispatchPolicy, DispatchError>,
    stopwatch: StopwatchStart,
}

impl PreparedRun {
    fn run(self) -> Result<RunStats, ExecuteError> {
        let PreparedRun {
            guard,
            settings,
            list,
            dispatch,
            stopwatch,
        } = self;
        let inner = &*guard.inner;

        let concurrent = settings.concurrent && !list.is_empty();
        let units = concurrent.then(|| list.work_units(settings.partitioning));
        let pool = match &units {
            Some(units) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(settings.test_threads.min(units.len()).max(1))
                    .thread_name(|idx| format!("unitrun-worker-{idx}"))
                    .build()?,
            ),
            None => None,
        };

        inner.set_state(RunState::Running);
        let invoker = TestInvoker::new(
            settings.post_actions_after_veto,
            CancelHandle::new(inner.cancel.clone()),
        );
        let mut ctx = RunContext::new(inner, dispatch, stopwatch, list.test_count());
        ctx.run_started();

        match (units, pool) {
            (Some(units), Some(pool)) => {
                debug!(
                    "running {} units of work on {} worker threads",
                    units.len(),
                    pool.current_num_threads()
                );
                let (sender, receiver) = crossbeam_channel::unbounded();
                let invoker = &invoker;
                // The scope body runs on this thread and coordinates. Workers only run tests.
                pool.in_place_scope(|scope| {
                    for unit in units {
                        let sender = sender.clone();
                        scope.spawn(move |_| {
                            let mut slot = InstanceSlot::default();
                            invoker.run_unit(&unit, &mut slot, |event| {
                                // Failure to send means the receiver was dropped.
                                _ = sender.send(event);
                            });
                        });
                    }
                    drop(sender);

                    for event in receiver.iter() {
                        ctx.handle_event(event);
                    }
                });
            }
            _ => {
                debug!("running {} tests sequentially", list.test_count());
                let mut slot = InstanceSlot::default();
                invoker.run_unit(list.iter(), &mut slot, |event| ctx.handle_event(event));
            }
        }

        let result = ctx.run_finished();
        inner.set_state(RunState::Completed);
        drop(guard);
        result
    }
}

/// Tracks statistics and raises lifecycle events for the active run.
struct RunContext<'a> {
    inner: &'a ExecutorInner,
    dispatch: Result<DispatchPolicy, DispatchError>,
    stopwatch: StopwatchStart,
    run_stats: RunStats,
    running: usize,
    first_error: Option<ExecuteError>,
}

impl<'a> RunContext<'a> {
    fn new(
        inner: &'a ExecutorInner,
        dispatch: Result<DispatchPolicy, DispatchError>,
        stopwatch: StopwatchStart,
        initial_run_count: usize,
    ) -> Self {
        Self {
            inner,
            dispatch,
            stopwatch,
            run_stats: RunStats::new(initial_run_count),
            running: 0,
            first_error: None,
        }
    }

    fn run_started(&mut self) {
        debug!(
            "test run started at {}",
            self.stopwatch.start_time().to_rfc3339()
        );
        self.publish(TestEventKind::RunStarted {
            total: self.run_stats.initial_run_count,
        });
    }

    fn handle_event(&mut self, event: InternalTestEvent) {
        match event {
            InternalTestEvent::Started { test } => {
                self.running += 1;
                self.publish(TestEventKind::TestStarted {
                    test,
                    running: self.running,
                    current_stats: self.run_stats,
                });
            }
            InternalTestEvent::Finished {
                test,
                outcome,
                start_time,
                time_taken,
            } => {
                self.running -= 1;
                self.record(outcome.kind());
                self.publish(TestEventKind::TestCompleted {
                    test,
                    outcome,
                    start_time,
                    time_taken,
                    current_stats: self.run_stats,
                    running: self.running,
                });
            }
            InternalTestEvent::Skipped { test, reason } => {
                self.running -= 1;
                if reason == SkipReason::Cancelled && self.run_stats.cancel_reason.is_none() {
                    self.run_stats.cancel_reason = Some(CancelReason::Requested);
                }
                self.record(OutcomeKind::Skipped);
                self.publish(TestEventKind::TestSkipped {
                    test,
                    reason,
                    current_stats: self.run_stats,
                    running: self.running,
                });
            }
        }
    }

    fn run_finished(mut self) -> Result<RunStats, ExecuteError> {
        let snapshot = self.stopwatch.snapshot();
        self.publish(TestEventKind::RunCompleted {
            summary: RunSummary {
                start_time: snapshot.start_time,
                elapsed: snapshot.duration,
                stats: self.run_stats,
            },
        });
        *self.inner.stats_lock() = self.run_stats;
        debug!(
            "test run completed in {:.3}s: {} passed, {} failed, {} threw, {} skipped, {} aborted",
            snapshot.duration.as_secs_f64(),
            self.run_stats.passed,
            self.run_stats.failed,
            self.run_stats.threw,
            self.run_stats.skipped,
            self.run_stats.aborted,
        );

        match self.first_error {
            Some(error) => Err(error),
            None => Ok(self.run_stats),
        }
    }

    fn record(&mut self, kind: OutcomeKind) {
        self.run_stats.record(kind);
        *self.inner.stats_lock() = self.run_stats;
    }

    fn publish(&mut self, kind: TestEventKind) {
        let event = TestEvent {
            timestamp: Local::now().fixed_offset(),
            elapsed: self.stopwatch.elapsed(),
            kind,
        };
        let result = match &self.dispatch {
            Ok(policy) => self.inner.bus.publish(event, policy),
            Err(error) => Err(error.clone().into()),
        };
        if let Err(error) = result {
            self.report_error(error);
        }
    }

    fn report_error(&mut self, error: ExecuteError) {
        if self.first_error.is_some() {
            debug!(
                "ignoring error while cancelling: {}",
                DisplayErrorChain::new(&error)
            );
            return;
        }
        debug!("cancelling test run: {}", DisplayErrorChain::new(&error));
        self.inner.cancel.store(true, Ordering::SeqCst);
        // Report errors are more severe than requested cancellation.
        self.run_stats.cancel_reason = self
            .run_stats
            .cancel_reason
            .max(Some(CancelReason::ReportError));
        self.first_error = Some(error);
    }
}
