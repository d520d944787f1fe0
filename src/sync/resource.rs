use super::{Blocker, ResourceId};
use crate::{
    runtime::{Kernel, ProcessId, ProcessState, SimContext, SimError},
    stats::{CollectorSet, DataCollector, Metric},
    time::SimTime,
};
use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt::Debug,
    future::Future,
    pin::Pin,
    rc::Weak,
    task::{Context, Poll},
};

#[derive(Debug, Clone, Copy)]
struct Holder {
    pid: ProcessId,
    arrival: SimTime,
    service_start: SimTime,
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    pid: ProcessId,
    arrival: SimTime,
}

pub(crate) struct ResourceState {
    name: String,
    capacity: usize,
    holders: Vec<Holder>,
    waiting: VecDeque<Waiter>,
    collector: Option<Weak<RefCell<CollectorSet>>>,
    last_arrival: SimTime,
}

impl ResourceState {
    fn in_system(&self) -> f64 {
        (self.holders.len() + self.waiting.len()) as f64
    }

    fn sample(&self, f: impl FnOnce(&mut CollectorSet)) {
        if let Some(collector) = self.collector.as_ref().and_then(Weak::upgrade) {
            f(&mut collector.borrow_mut());
        }
    }

    fn is_waiting(&self, pid: ProcessId) -> bool {
        self.waiting.iter().any(|w| w.pid == pid)
    }
}

impl Kernel {
    pub(crate) fn create_resource(
        &mut self,
        capacity: usize,
        collector: Option<&DataCollector>,
    ) -> ResourceId {
        let id = ResourceId(self.resources.len());
        let state = ResourceState {
            name: format!("Resource#{}", id.0),
            capacity,
            holders: Vec::with_capacity(capacity),
            waiting: VecDeque::new(),
            collector: collector.map(DataCollector::downgrade),
            last_arrival: self.now,
        };

        let now = self.now;
        state.sample(|c| {
            c.level(Metric::InSystems, now, 0.0);
            c.level(Metric::InServices, now, 0.0);
            c.level(Metric::InQueues, now, 0.0);
        });

        tracing::debug!(resource = %state.name, capacity, "created resource");
        self.resources.push(state);
        id
    }

    ///
    /// Requests one unit of a resource for `pid`.
    ///
    /// Returns `true` if the unit was granted immediately, otherwise the
    /// process was appended to the wait queue and is now blocked.
    ///
    pub(crate) fn resource_acquire(&mut self, rid: ResourceId, pid: ProcessId) -> bool {
        let now = self.now;
        let res = &mut self.resources[rid.0];

        let inter_arrival = now - res.last_arrival;
        res.last_arrival = now;
        let in_system = res.in_system() + 1.0;
        res.sample(|c| {
            c.mark(Metric::Arrivals, now);
            c.sample(Metric::InterArrivals, inter_arrival);
            c.level(Metric::InSystems, now, in_system);
        });

        if res.holders.len() < res.capacity {
            res.holders.push(Holder {
                pid,
                arrival: now,
                service_start: now,
            });
            let in_service = res.holders.len() as f64;
            res.sample(|c| {
                c.mark(Metric::Services, now);
                c.sample(Metric::QueueTimes, 0.0);
                c.level(Metric::InServices, now, in_service);
            });
            tracing::trace!(%pid, resource = %res.name, "granted immediately");

            if let Some(record) = self.processes.get_mut(&pid) {
                record.held.push(rid);
            }
            true
        } else {
            res.waiting.push_back(Waiter { pid, arrival: now });
            let in_queue = res.waiting.len() as f64;
            res.sample(|c| c.level(Metric::InQueues, now, in_queue));
            tracing::trace!(%pid, resource = %res.name, queued = res.waiting.len(), "blocked");

            if let Some(record) = self.processes.get_mut(&pid) {
                record.blocker = Some(Blocker::Resource(rid));
                record.state = ProcessState::Blocked;
            }
            false
        }
    }

    ///
    /// Returns one unit of a resource held by `pid` and grants freed
    /// units to the head of the wait queue.
    ///
    pub(crate) fn resource_release(
        &mut self,
        rid: ResourceId,
        pid: ProcessId,
    ) -> Result<(), SimError> {
        let now = self.now;
        let res = &mut self.resources[rid.0];

        let Some(idx) = res.holders.iter().position(|h| h.pid == pid) else {
            return Err(SimError::NotHeld {
                process: pid,
                resource: res.name.clone(),
            });
        };
        let holder = res.holders.remove(idx);

        let in_service = res.holders.len() as f64;
        let in_system = res.in_system();
        res.sample(|c| {
            c.mark(Metric::Departs, now);
            c.sample(Metric::ServiceTimes, now - holder.service_start);
            c.sample(Metric::SystemTimes, now - holder.arrival);
            c.level(Metric::InServices, now, in_service);
            c.level(Metric::InSystems, now, in_system);
        });
        tracing::trace!(%pid, resource = %res.name, "released");

        if let Some(record) = self.processes.get_mut(&pid) {
            if let Some(pos) = record.held.iter().rposition(|r| *r == rid) {
                record.held.remove(pos);
            }
        }

        self.resource_grant(rid);
        Ok(())
    }

    fn resource_grant(&mut self, rid: ResourceId) {
        let now = self.now;
        loop {
            let res = &mut self.resources[rid.0];
            if res.holders.len() >= res.capacity {
                break;
            }
            let Some(waiter) = res.waiting.pop_front() else {
                break;
            };

            res.holders.push(Holder {
                pid: waiter.pid,
                arrival: waiter.arrival,
                service_start: now,
            });
            let in_queue = res.waiting.len() as f64;
            let in_service = res.holders.len() as f64;
            res.sample(|c| {
                c.mark(Metric::Services, now);
                c.sample(Metric::QueueTimes, now - waiter.arrival);
                c.level(Metric::InQueues, now, in_queue);
                c.level(Metric::InServices, now, in_service);
            });
            tracing::debug!(pid = %waiter.pid, resource = %res.name, "granted from queue");

            if let Some(record) = self.processes.get_mut(&waiter.pid) {
                record.held.push(rid);
            }
            self.wake(waiter.pid);
        }
    }

    /// Removes a blocked process from the wait queue without serving it.
    pub(crate) fn resource_renege(&mut self, rid: ResourceId, pid: ProcessId) {
        let now = self.now;
        let res = &mut self.resources[rid.0];
        let Some(idx) = res.waiting.iter().position(|w| w.pid == pid) else {
            return;
        };
        let Some(waiter) = res.waiting.remove(idx) else {
            return;
        };

        let in_queue = res.waiting.len() as f64;
        let in_system = res.in_system();
        res.sample(|c| {
            c.mark(Metric::Reneges, now);
            c.sample(Metric::RenegeTimes, now - waiter.arrival);
            c.level(Metric::InQueues, now, in_queue);
            c.level(Metric::InSystems, now, in_system);
        });
        tracing::debug!(%pid, resource = %res.name, "reneged");
    }

    ///
    /// Withdraws a request of `pid` whose future was dropped before it
    /// completed. A queued request reneges, a unit that was granted but
    /// never observed is released again.
    ///
    pub(crate) fn resource_abandon(&mut self, rid: ResourceId, pid: ProcessId) {
        let res = &self.resources[rid.0];
        if res.is_waiting(pid) {
            self.resource_renege(rid, pid);
            if let Some(record) = self.processes.get_mut(&pid) {
                if record.blocker == Some(Blocker::Resource(rid)) {
                    record.blocker = None;
                    record.state = ProcessState::Runnable;
                }
            }
        } else if res.holders.iter().any(|h| h.pid == pid) {
            if let Err(e) = self.resource_release(rid, pid) {
                tracing::error!(%pid, "abandoned grant release failed: {e}");
            }
        }
    }
}

///
/// A counting semaphore with a FIFO wait queue.
///
/// A resource hands out up to `capacity` units. Processes that
/// request a unit while all are taken wait in strict arrival order.
/// If a [`DataCollector`] is bound, every arrival, grant, departure and
/// renege is sampled at the current simulation time.
///
/// # Examples
///
/// ```
/// use dessim::prelude::*;
///
/// let mut sim = Simulator::new();
/// let server = sim.resource(1, None).unwrap();
///
/// for _ in 0..2 {
///     let server = server.clone();
///     sim.process(move |ctx| async move {
///         server.acquire().await?;
///         ctx.sleep(5.0).await?;
///         server.release()
///     })
///     .unwrap();
/// }
///
/// sim.run(100.0).unwrap();
/// assert_eq!(server.in_use(), 0);
/// ```
#[derive(Clone)]
pub struct Resource {
    ctx: SimContext,
    id: ResourceId,
    capacity: usize,
}

impl Resource {
    pub(crate) fn new(ctx: SimContext, id: ResourceId, capacity: usize) -> Self {
        Self { ctx, id, capacity }
    }

    /// The id of this resource.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The number of units this resource provides.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of units currently granted.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.ctx
            .with_kernel(|k| k.resources[self.id.0].holders.len())
            .unwrap_or(0)
    }

    /// The number of units that could be granted without blocking.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.in_use()
    }

    /// The number of processes blocked in the wait queue.
    #[must_use]
    pub fn num_waiting(&self) -> usize {
        self.ctx
            .with_kernel(|k| k.resources[self.id.0].waiting.len())
            .unwrap_or(0)
    }

    /// Whether the given process currently holds a unit of this resource.
    #[must_use]
    pub fn is_holding(&self, pid: ProcessId) -> bool {
        self.ctx
            .with_kernel(|k| k.resources[self.id.0].holders.iter().any(|h| h.pid == pid))
            .unwrap_or(false)
    }

    ///
    /// Requests a unit of this resource for the calling process.
    ///
    /// The returned future completes on its first poll if a unit is free,
    /// otherwise the process blocks until it reaches the head of the
    /// wait queue and a unit is released. Dropping the future while it
    /// waits reneges, so a request can be raced against a timeout.
    ///
    pub fn acquire(&self) -> Acquire {
        Acquire {
            ctx: self.ctx.clone(),
            id: self.id,
            waiting: None,
        }
    }

    ///
    /// Returns a unit held by the calling process.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::NotHeld`] if the calling process holds no unit,
    /// and with [`SimError::NoProcessContext`] outside of a process.
    ///
    pub fn release(&self) -> Result<(), SimError> {
        self.ctx.with_kernel(|k| {
            let pid = k.current.ok_or(SimError::NoProcessContext)?;
            k.resource_release(self.id, pid)
        })?
    }
}

impl Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .finish()
    }
}

///
/// Future returned by [`Resource::acquire`].
///
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Acquire {
    ctx: SimContext,
    id: ResourceId,
    waiting: Option<ProcessId>,
}

impl Future for Acquire {
    type Output = Result<(), SimError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        let waiting = self.waiting;
        let result = self.ctx.with_kernel(|k| match waiting {
            None => {
                let pid = k.current.ok_or(SimError::NoProcessContext)?;
                if k.resource_acquire(id, pid) {
                    Ok(None)
                } else {
                    Ok(Some(pid))
                }
            }
            Some(pid) if k.resources[id.0].is_waiting(pid) => Ok(Some(pid)),
            Some(_) => Ok(None),
        });

        match result.and_then(|r| r) {
            Ok(Some(pid)) => {
                self.waiting = Some(pid);
                Poll::Pending
            }
            ready => {
                self.waiting = None;
                Poll::Ready(ready.map(|_| ()))
            }
        }
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        if let Some(pid) = self.waiting.take() {
            let id = self.id;
            self.ctx.try_with_kernel(|k| k.resource_abandon(id, pid));
        }
    }
}
