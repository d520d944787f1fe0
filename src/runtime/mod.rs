//!
//! Central primitives for running a discrete event simulation.
//!
//! A [`Simulator`] owns the clock, the future event set and every live
//! process. Processes receive a [`SimContext`], a weak handle through
//! which they sleep, spawn further processes and reach shared facilities.
//!
//! ```
//! use dessim::prelude::*;
//!
//! let mut sim = Simulator::new();
//! sim.process(|ctx| async move {
//!     ctx.sleep(5.0).await?;
//!     assert_eq!(ctx.now(), SimTime::new(5.0));
//!     Ok::<_, SimError>(())
//! })
//! .unwrap();
//!
//! let summary = sim.run(10.0).unwrap();
//! assert_eq!(summary.events_dispatched, 2);
//! assert_eq!(sim.now(), SimTime::new(10.0));
//! ```

use crate::{
    stats::{CollectorSpec, DataCollector, Metric},
    sync::{Resource, ResourceState, Store, StoreState},
    time::SimTime,
};
use fxhash::FxHashMap;
use std::{
    cell::RefCell,
    fmt::Debug,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
    task::{Context, Poll},
};
use tracing::{debug, info_span, trace};

mod builder;
pub use self::builder::*;

mod error;
pub use self::error::*;

mod event;
pub use self::event::*;

mod limit;
pub use self::limit::*;

mod process;
pub use self::process::*;

/// The work attached to a scheduled event.
pub(crate) enum Continuation {
    Resume(ProcessId),
    Call(Box<dyn FnOnce(&SimContext)>),
}

///
/// When a scheduled callback should fire.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum When {
    /// After the given number of time units, relative to the current time.
    Delay(f64),
    /// At an absolute simulation time.
    At(SimTime),
}

impl From<SimTime> for When {
    fn from(time: SimTime) -> Self {
        When::At(time)
    }
}

impl From<f64> for When {
    fn from(delay: f64) -> Self {
        When::Delay(delay)
    }
}

/// The result of a successful call to [`Simulator::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// The simulation time after the run.
    pub time: SimTime,
    /// The number of events dispatched during this run.
    pub events_dispatched: usize,
    /// The number of events left pending.
    pub events_pending: usize,
}

pub(crate) struct Kernel {
    pub(crate) now: SimTime,
    pub(crate) queue: EventQueue<Continuation>,
    pub(crate) itr: usize,

    pub(crate) processes: FxHashMap<ProcessId, ProcessRecord>,
    pub(crate) next_pid: u64,
    pub(crate) current: Option<ProcessId>,

    pub(crate) resources: Vec<ResourceState>,
    pub(crate) stores: Vec<StoreState>,

    pub(crate) faults: Vec<ProcessFault>,
}

impl Kernel {
    fn new(start_time: SimTime) -> Self {
        Self {
            now: start_time,
            queue: EventQueue::new(start_time),
            itr: 0,

            processes: FxHashMap::default(),
            next_pid: 0,
            current: None,

            resources: Vec::new(),
            stores: Vec::new(),

            faults: Vec::new(),
        }
    }

    pub(crate) fn resolve(&self, when: When) -> SimTime {
        match when {
            When::Delay(delay) => self.now + delay,
            When::At(time) => time,
        }
    }

    pub(crate) fn schedule_at(
        &mut self,
        time: SimTime,
        continuation: Continuation,
    ) -> Result<EventHandle, SimError> {
        if !time.is_valid() || time < self.now {
            return Err(SimError::InvalidTime {
                requested: time,
                now: self.now,
            });
        }
        Ok(self.queue.add(time, continuation))
    }
}

pub(crate) struct Shared {
    pub(crate) kernel: RefCell<Kernel>,
    pub(crate) unwind: UnwindBehaviour,
}

///
/// A weak, cloneable handle to a [`Simulator`].
///
/// Every process receives a context as the argument of its entry point.
/// Operations on a context whose simulator was dropped fail with
/// [`SimError::SimulatorDropped`].
///
#[derive(Clone)]
pub struct SimContext {
    shared: Weak<Shared>,
}

impl SimContext {
    pub(crate) fn upgrade(&self) -> Result<Rc<Shared>, SimError> {
        self.shared.upgrade().ok_or(SimError::SimulatorDropped)
    }

    pub(crate) fn with_kernel<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> Result<R, SimError> {
        let shared = self.upgrade()?;
        let mut kernel = shared.kernel.borrow_mut();
        Ok(f(&mut kernel))
    }

    /// Like `with_kernel`, but skips `f` if the simulator is gone or the
    /// kernel is already borrowed. Used from `Drop` implementations.
    pub(crate) fn try_with_kernel<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
        let shared = self.shared.upgrade()?;
        let mut kernel = shared.kernel.try_borrow_mut().ok()?;
        Some(f(&mut kernel))
    }

    ///
    /// Returns the current simulation time.
    ///
    /// A dropped simulator reports [`SimTime::INFINITY`].
    ///
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.with_kernel(|k| k.now).unwrap_or(SimTime::INFINITY)
    }

    /// Returns the process currently being polled, if any.
    #[must_use]
    pub fn current_process(&self) -> Option<ProcessId> {
        self.with_kernel(|k| k.current).ok().flatten()
    }

    ///
    /// Suspends the calling process for `duration` time units.
    ///
    /// The returned future fails with [`SimError::InvalidDuration`] for
    /// negative or NaN durations and with [`SimError::NoProcessContext`]
    /// when awaited outside of a process.
    ///
    pub fn sleep(&self, duration: f64) -> Sleep {
        Sleep::new(self.clone(), duration)
    }

    ///
    /// Spawns a process that starts at the current simulation time.
    ///
    /// The entry point is called immediately to create the process future,
    /// but no process code runs until the start event is dispatched.
    ///
    /// # Errors
    ///
    /// Fails if the simulator no longer exists.
    pub fn process<F, Fut>(&self, entry: F) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        self.spawn(None, 0.0, entry)
    }

    ///
    /// Spawns a process that starts `delay` time units from now.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::InvalidDuration`] for negative or NaN delays.
    pub fn process_in<F, Fut>(&self, delay: f64, entry: F) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        self.spawn(None, delay, entry)
    }

    ///
    /// Spawns a named process that starts at the current simulation time.
    ///
    /// # Errors
    ///
    /// Fails if the simulator no longer exists.
    pub fn process_named<F, Fut>(
        &self,
        name: impl Into<String>,
        entry: F,
    ) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        self.spawn(Some(name.into()), 0.0, entry)
    }

    fn spawn<F, Fut>(
        &self,
        name: Option<String>,
        delay: f64,
        entry: F,
    ) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        let shared = self.upgrade()?;
        let task: Task = Box::pin(Guarded::new(entry(self.clone()), shared.unwind));
        let id = shared.kernel.borrow_mut().spawn(name, delay, task)?;
        Ok(ProcessHandle {
            id,
            ctx: self.clone(),
        })
    }

    ///
    /// Schedules a callback.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::InvalidTime`] if the resulting time lies
    /// before the current time or is not a number.
    pub fn schedule(
        &self,
        when: impl Into<When>,
        callback: impl FnOnce(&SimContext) + 'static,
    ) -> Result<EventHandle, SimError> {
        let when = when.into();
        self.with_kernel(|k| {
            let time = k.resolve(when);
            k.schedule_at(time, Continuation::Call(Box::new(callback)))
        })?
    }

    ///
    /// Cancels a pending event.
    ///
    /// Returns `Ok(false)` if the event was already dispatched or cancelled.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::UnknownHandle`] if the handle was never issued.
    pub fn cancel(&self, handle: EventHandle) -> Result<bool, SimError> {
        self.with_kernel(|k| k.queue.cancel(handle))?
    }

    ///
    /// Terminates a process.
    ///
    /// The process is removed from any wait queue, its pending sleep is
    /// cancelled and its resources are released in reverse acquisition order.
    /// A process that kills itself terminates once it next yields.
    ///
    /// Returns `Ok(false)` if the process had already terminated.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::UnknownProcess`] if the id was never issued.
    pub fn kill(&self, pid: ProcessId) -> Result<bool, SimError> {
        let shared = self.upgrade()?;
        let removed = {
            let mut kernel = shared.kernel.borrow_mut();
            if pid.0 >= kernel.next_pid {
                return Err(SimError::UnknownProcess(pid));
            }

            let current = kernel.current;
            let deferred = match kernel.processes.get(&pid) {
                None => return Ok(false),
                Some(record) if record.killed => return Ok(false),
                Some(record) => current == Some(pid) || record.task.is_none(),
            };

            if deferred {
                if let Some(record) = kernel.processes.get_mut(&pid) {
                    record.killed = true;
                }
                debug!(%pid, "process will terminate on yield");
                return Ok(true);
            }
            kernel.terminate(pid, Ok(()))
        };
        drop(removed);
        Ok(true)
    }

    ///
    /// Creates a new resource with the given capacity, optionally bound to a
    /// data collector.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::InvalidCapacity`] if `capacity < 1`.
    pub fn resource(
        &self,
        capacity: usize,
        collector: Option<&DataCollector>,
    ) -> Result<Resource, SimError> {
        if capacity < 1 {
            return Err(SimError::InvalidCapacity(capacity as f64));
        }
        let id = self.with_kernel(|k| k.create_resource(capacity, collector))?;
        Ok(Resource::new(self.clone(), id, capacity))
    }

    ///
    /// Creates a new store with the given capacity and initial level.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::InvalidCapacity`] for a non positive capacity
    /// and with [`SimError::InvalidAmount`] for an initial level outside `[0, capacity]`.
    pub fn store(&self, capacity: f64, initial_level: f64) -> Result<Store, SimError> {
        if capacity.is_nan() || capacity <= 0.0 {
            return Err(SimError::InvalidCapacity(capacity));
        }
        if initial_level.is_nan() || initial_level < 0.0 || initial_level > capacity {
            return Err(SimError::InvalidAmount(initial_level));
        }
        let id = self.with_kernel(|k| k.create_store(capacity, initial_level))?;
        Ok(Store::new(self.clone(), id, capacity))
    }
}

impl Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

///
/// The central managment point of a process oriented discrete event simulation.
///
/// The simulator owns the clock, the future event set and all live
/// processes. Use a [`Builder`] for non default configurations.
///
pub struct Simulator {
    shared: Rc<Shared>,
    limit: RuntimeLimit,
}

impl Simulator {
    /// Creates a simulator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Builder::new().build()
    }

    pub(crate) fn from_builder(builder: Builder) -> Self {
        Self {
            shared: Rc::new(Shared {
                kernel: RefCell::new(Kernel::new(builder.start_time)),
                unwind: builder.unwind,
            }),
            limit: builder.limit,
        }
    }

    /// Returns a context handle to this simulator.
    #[must_use]
    pub fn context(&self) -> SimContext {
        SimContext {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.shared.kernel.borrow().now
    }

    /// Returns the time of the next pending event.
    #[must_use]
    pub fn peek(&self) -> Option<SimTime> {
        self.shared.kernel.borrow_mut().queue.peek_time()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.shared.kernel.borrow().queue.len()
    }

    /// Returns the number of events dispatched over the lifetime of this simulator.
    #[must_use]
    pub fn events_dispatched(&self) -> usize {
        self.shared.kernel.borrow().itr
    }

    /// Returns the number of processes that have not yet terminated.
    #[must_use]
    pub fn live_processes(&self) -> usize {
        self.shared.kernel.borrow().processes.len()
    }

    /// Returns the configured limit that applies to every run.
    #[must_use]
    pub fn limit(&self) -> &RuntimeLimit {
        &self.limit
    }

    /// See [`SimContext::process`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::process`].
    pub fn process<F, Fut>(&self, entry: F) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        self.context().process(entry)
    }

    /// See [`SimContext::process_in`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::process_in`].
    pub fn process_in<F, Fut>(&self, delay: f64, entry: F) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        self.context().process_in(delay, entry)
    }

    /// See [`SimContext::process_named`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::process_named`].
    pub fn process_named<F, Fut>(
        &self,
        name: impl Into<String>,
        entry: F,
    ) -> Result<ProcessHandle, SimError>
    where
        F: FnOnce(SimContext) -> Fut,
        Fut: Future + 'static,
        Fut::Output: ProcessOutput,
    {
        self.context().process_named(name, entry)
    }

    /// See [`SimContext::schedule`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::schedule`].
    pub fn schedule(
        &self,
        when: impl Into<When>,
        callback: impl FnOnce(&SimContext) + 'static,
    ) -> Result<EventHandle, SimError> {
        self.context().schedule(when, callback)
    }

    /// See [`SimContext::cancel`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::cancel`].
    pub fn cancel(&self, handle: EventHandle) -> Result<bool, SimError> {
        self.context().cancel(handle)
    }

    /// See [`SimContext::kill`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::kill`].
    pub fn kill(&self, pid: ProcessId) -> Result<bool, SimError> {
        self.context().kill(pid)
    }

    /// See [`SimContext::resource`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::resource`].
    pub fn resource(
        &self,
        capacity: usize,
        collector: Option<&DataCollector>,
    ) -> Result<Resource, SimError> {
        self.context().resource(capacity, collector)
    }

    /// See [`SimContext::store`].
    ///
    /// # Errors
    ///
    /// See [`SimContext::store`].
    pub fn store(&self, capacity: f64, initial_level: f64) -> Result<Store, SimError> {
        self.context().store(capacity, initial_level)
    }

    ///
    /// Creates a data collector whose time marks are measured from the
    /// current simulation time.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::Config`] on an invalid mapping.
    pub fn data_collector(
        &self,
        config: impl IntoIterator<Item = (Metric, CollectorSpec)>,
    ) -> Result<DataCollector, SimError> {
        Ok(DataCollector::starting_at(self.now(), config)?)
    }

    ///
    /// Dispatches events until the next event lies beyond `horizon`
    /// or no events are left.
    ///
    /// Events at exactly `horizon` are dispatched, later events stay pending.
    /// Afterwards the clock is advanced to a finite `horizon`, or to an
    /// earlier time bound of the configured limit.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::InvalidTime`] if `horizon` lies before the current
    /// time, and with [`SimError::ProcessFaults`] if processes faulted during
    /// the run. Faults do not interrupt the run.
    pub fn run(&mut self, horizon: impl Into<SimTime>) -> Result<RunSummary, SimError> {
        let horizon = horizon.into();
        let now = self.now();
        if !horizon.is_valid() || horizon < now {
            return Err(SimError::InvalidTime {
                requested: horizon,
                now,
            });
        }

        let limit = self.limit.clone() | RuntimeLimit::SimTime(horizon);
        let start_itr = self.events_dispatched();
        debug!(%horizon, %limit, "run started");

        while self.dispatch_event(&limit) {}

        // The clock never moves past a time bound of the configured limit.
        let bound = limit.time_bound().unwrap_or(horizon).min(horizon);
        let mut kernel = self.shared.kernel.borrow_mut();
        let drained = kernel.queue.peek_time().map_or(true, |t| t > bound);
        if drained && bound.is_finite() && kernel.now < bound {
            kernel.now = bound;
        }

        let summary = RunSummary {
            time: kernel.now,
            events_dispatched: kernel.itr - start_itr,
            events_pending: kernel.queue.len(),
        };
        debug!(
            time = %summary.time,
            dispatched = summary.events_dispatched,
            pending = summary.events_pending,
            "run finished"
        );

        let faults = std::mem::take(&mut kernel.faults);
        if faults.is_empty() {
            Ok(summary)
        } else {
            Err(SimError::ProcessFaults(faults))
        }
    }

    ///
    /// Runs for `offset` time units from the current time.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::InvalidDuration`] for a negative offset,
    /// otherwise see [`Simulator::run`].
    pub fn run_for(&mut self, offset: f64) -> Result<RunSummary, SimError> {
        if offset.is_nan() || offset < 0.0 {
            return Err(SimError::InvalidDuration(offset));
        }
        let horizon = self.now() + offset;
        self.run(horizon)
    }

    ///
    /// Runs until no events are left, or the configured limit applies.
    ///
    /// # Errors
    ///
    /// See [`Simulator::run`].
    pub fn run_forever(&mut self) -> Result<RunSummary, SimError> {
        self.run(SimTime::INFINITY)
    }

    ///
    /// Dispatches exactly one event, ignoring the configured limit.
    ///
    /// Returns `Ok(false)` if no event was pending.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::ProcessFaults`] if the dispatched event faulted.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let dispatched = self.dispatch_event(&RuntimeLimit::None);
        let faults = std::mem::take(&mut self.shared.kernel.borrow_mut().faults);
        if faults.is_empty() {
            Ok(dispatched)
        } else {
            Err(SimError::ProcessFaults(faults))
        }
    }

    /// Processes the next event in the future event set.
    /// Returns `false` if the run should stop.
    fn dispatch_event(&self, limit: &RuntimeLimit) -> bool {
        let (time, continuation) = {
            let mut kernel = self.shared.kernel.borrow_mut();
            let Some(time) = kernel.queue.peek_time() else {
                return false;
            };
            if limit.exceeded(kernel.itr + 1, time) {
                return false;
            }
            let Some(node) = kernel.queue.fetch_next() else {
                return false;
            };

            kernel.itr += 1;
            // Let this be the only position where the clock advances
            kernel.now = node.time;
            (node.time, node.payload)
        };

        let span = info_span!("event", time = time.as_f64());
        let _guard = span.enter();

        match continuation {
            Continuation::Resume(pid) => self.resume(pid),
            Continuation::Call(callback) => self.call(time, callback),
        }
        true
    }

    fn call(&self, time: SimTime, callback: Box<dyn FnOnce(&SimContext)>) {
        trace!("dispatching callback");
        let ctx = self.context();
        match self.shared.unwind {
            UnwindBehaviour::Unwind => callback(&ctx),
            UnwindBehaviour::Catch => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(&ctx))) {
                    let reason = panic_message(payload.as_ref());
                    tracing::warn!("callback faulted: {reason}");
                    self.shared.kernel.borrow_mut().faults.push(ProcessFault {
                        process: None,
                        time,
                        reason,
                    });
                }
            }
        }
    }

    fn resume(&self, pid: ProcessId) {
        let mut task = {
            let mut kernel = self.shared.kernel.borrow_mut();
            let Kernel {
                processes, queue, ..
            } = &mut *kernel;

            let Some(record) = processes.get_mut(&pid) else {
                trace!(%pid, "skipping resume of terminated process");
                return;
            };
            let Some(task) = record.task.take() else {
                return;
            };
            if record.pending.is_some_and(|h| !queue.is_pending(h)) {
                record.pending = None;
            }
            if record.blocker.is_none() {
                record.state = ProcessState::Runnable;
            }
            kernel.current = Some(pid);
            task
        };

        let poll = {
            let span = info_span!("process", pid = pid.as_u64());
            let _guard = span.enter();
            trace!("resuming process");
            let mut cx = Context::from_waker(futures::task::noop_waker_ref());
            task.as_mut().poll(&mut cx)
        };

        let removed = {
            let mut kernel = self.shared.kernel.borrow_mut();
            kernel.current = None;
            match poll {
                Poll::Ready(outcome) => kernel.terminate(pid, outcome),
                Poll::Pending => match kernel.processes.get(&pid).map(|r| r.killed) {
                    Some(false) => {
                        if let Some(record) = kernel.processes.get_mut(&pid) {
                            record.task = Some(task);
                        }
                        return;
                    }
                    Some(true) => kernel.terminate(pid, Ok(())),
                    None => None,
                },
            }
        };
        drop(removed);
        drop(task);
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kernel = self.shared.kernel.borrow();
        write!(
            f,
            "Simulator {{ sim_time: {} (itr {} / {}) enqueued: {} processes: {} }}",
            kernel.now,
            kernel.itr,
            self.limit,
            kernel.queue.len(),
            kernel.processes.len()
        )
    }
}
