use super::{Blocker, StoreId};
use crate::runtime::{Kernel, ProcessId, ProcessState, SimContext, SimError};
use std::{
    collections::VecDeque,
    fmt::Debug,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

#[derive(Debug, Clone, Copy)]
struct Pending {
    pid: ProcessId,
    amount: f64,
}

pub(crate) struct StoreState {
    name: String,
    capacity: f64,
    level: f64,
    putters: VecDeque<Pending>,
    getters: VecDeque<Pending>,
}

impl StoreState {
    fn validate(&self, amount: f64) -> Result<(), SimError> {
        if amount.is_nan() || amount <= 0.0 || amount > self.capacity {
            Err(SimError::InvalidAmount(amount))
        } else {
            Ok(())
        }
    }

    fn can_put(&self, amount: f64) -> bool {
        self.level + amount <= self.capacity
    }

    fn can_get(&self, amount: f64) -> bool {
        amount <= self.level
    }

    fn is_queued(&self, pid: ProcessId) -> bool {
        self.putters.iter().chain(self.getters.iter()).any(|p| p.pid == pid)
    }
}

/// The direction of a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Put,
    Get,
}

impl Kernel {
    pub(crate) fn create_store(&mut self, capacity: f64, initial_level: f64) -> StoreId {
        let id = StoreId(self.stores.len());
        let state = StoreState {
            name: format!("Store#{}", id.0),
            capacity,
            level: initial_level,
            putters: VecDeque::new(),
            getters: VecDeque::new(),
        };
        tracing::debug!(store = %state.name, capacity, level = initial_level, "created store");
        self.stores.push(state);
        id
    }

    ///
    /// Performs a put or get for `pid`, or enqueues it if the store
    /// cannot serve it now, or another process of the same side waits
    /// ahead of it.
    ///
    /// Returns `true` if the operation completed immediately.
    ///
    fn store_request(
        &mut self,
        sid: StoreId,
        pid: ProcessId,
        op: Op,
        amount: f64,
    ) -> Result<bool, SimError> {
        let store = &mut self.stores[sid.0];
        store.validate(amount)?;

        let request = Pending { pid, amount };
        let done = match op {
            Op::Put if store.putters.is_empty() && store.can_put(amount) => {
                store.level += amount;
                true
            }
            Op::Get if store.getters.is_empty() && store.can_get(amount) => {
                store.level -= amount;
                true
            }
            Op::Put => {
                store.putters.push_back(request);
                false
            }
            Op::Get => {
                store.getters.push_back(request);
                false
            }
        };
        tracing::trace!(%pid, store = %store.name, ?op, amount, level = store.level, done, "store request");

        if done {
            self.store_settle(sid);
        } else if let Some(record) = self.processes.get_mut(&pid) {
            record.blocker = Some(Blocker::Store(sid));
            record.state = ProcessState::Blocked;
        }
        Ok(done)
    }

    /// Serves queue heads on both sides until neither can proceed.
    fn store_settle(&mut self, sid: StoreId) {
        loop {
            let store = &mut self.stores[sid.0];
            let mut woken = Vec::new();

            if let Some(head) = store.putters.front().copied() {
                if store.can_put(head.amount) {
                    store.putters.pop_front();
                    store.level += head.amount;
                    woken.push(head.pid);
                }
            }
            if let Some(head) = store.getters.front().copied() {
                if store.can_get(head.amount) {
                    store.getters.pop_front();
                    store.level -= head.amount;
                    woken.push(head.pid);
                }
            }

            if woken.is_empty() {
                break;
            }
            for pid in woken {
                self.wake(pid);
            }
        }
    }

    /// Removes a blocked process from either queue of a store.
    pub(crate) fn store_renege(&mut self, sid: StoreId, pid: ProcessId) {
        let store = &mut self.stores[sid.0];
        store.putters.retain(|p| p.pid != pid);
        store.getters.retain(|p| p.pid != pid);
        tracing::debug!(%pid, store = %store.name, "reneged");

        // The removed waiter may have blocked the head of line.
        self.store_settle(sid);
    }

    /// Withdraws a queued operation of `pid` whose future was dropped.
    pub(crate) fn store_abandon(&mut self, sid: StoreId, pid: ProcessId) {
        if !self.stores[sid.0].is_queued(pid) {
            return;
        }
        self.store_renege(sid, pid);
        if let Some(record) = self.processes.get_mut(&pid) {
            if record.blocker == Some(Blocker::Store(sid)) {
                record.blocker = None;
                record.state = ProcessState::Runnable;
            }
        }
    }
}

///
/// A capacity bounded level shared by producers and consumers.
///
/// Producers [`put`](Store::put) amounts into the store and block while
/// the store would overflow, consumers [`get`](Store::get) amounts and
/// block while the level is too low. Both sides are served strictly
/// first come, first served.
///
/// # Examples
///
/// ```
/// use dessim::prelude::*;
///
/// let mut sim = Simulator::new();
/// let tank = sim.store(10.0, 0.0).unwrap();
///
/// let consumer = tank.clone();
/// sim.process(move |_| async move { consumer.get(4.0).await }).unwrap();
///
/// let producer = tank.clone();
/// sim.process_in(3.0, move |_| async move { producer.put(6.0).await }).unwrap();
///
/// sim.run(10.0).unwrap();
/// assert_eq!(tank.level(), 2.0);
/// ```
#[derive(Clone)]
pub struct Store {
    ctx: SimContext,
    id: StoreId,
    capacity: f64,
}

impl Store {
    pub(crate) fn new(ctx: SimContext, id: StoreId, capacity: f64) -> Self {
        Self { ctx, id, capacity }
    }

    /// The id of this store.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// The maximum level of this store.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// The current level of this store.
    #[must_use]
    pub fn level(&self) -> f64 {
        self.ctx
            .with_kernel(|k| k.stores[self.id.0].level)
            .unwrap_or(0.0)
    }

    /// The number of consumers waiting for a sufficient level.
    #[must_use]
    pub fn getters_in_queue(&self) -> usize {
        self.ctx
            .with_kernel(|k| k.stores[self.id.0].getters.len())
            .unwrap_or(0)
    }

    /// The number of producers waiting for sufficient space.
    #[must_use]
    pub fn putters_in_queue(&self) -> usize {
        self.ctx
            .with_kernel(|k| k.stores[self.id.0].putters.len())
            .unwrap_or(0)
    }

    ///
    /// Adds `amount` to the store, blocking while it would overflow.
    ///
    /// The future fails with [`SimError::InvalidAmount`] if `amount` is not
    /// within `(0, capacity]`.
    ///
    pub fn put(&self, amount: f64) -> StoreOp {
        StoreOp::new(self.ctx.clone(), self.id, Op::Put, amount)
    }

    ///
    /// Removes `amount` from the store, blocking while the level is too low.
    ///
    /// The future fails with [`SimError::InvalidAmount`] if `amount` is not
    /// within `(0, capacity]`.
    ///
    pub fn get(&self, amount: f64) -> StoreOp {
        StoreOp::new(self.ctx.clone(), self.id, Op::Get, amount)
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .finish()
    }
}

///
/// Future returned by [`Store::put`] and [`Store::get`].
///
/// Dropping a queued operation withdraws it from the store. A transfer
/// that already took place stays in effect.
///
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct StoreOp {
    ctx: SimContext,
    id: StoreId,
    op: Op,
    amount: f64,
    waiting: Option<ProcessId>,
}

impl StoreOp {
    fn new(ctx: SimContext, id: StoreId, op: Op, amount: f64) -> Self {
        Self {
            ctx,
            id,
            op,
            amount,
            waiting: None,
        }
    }
}

impl Future for StoreOp {
    type Output = Result<(), SimError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let (id, op, amount, waiting) = (self.id, self.op, self.amount, self.waiting);
        let result = self.ctx.with_kernel(|k| match waiting {
            None => {
                let pid = k.current.ok_or(SimError::NoProcessContext)?;
                let done = k.store_request(id, pid, op, amount)?;
                Ok((!done).then_some(pid))
            }
            Some(pid) if k.stores[id.0].is_queued(pid) => Ok(Some(pid)),
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

impl Drop for StoreOp {
    fn drop(&mut self) {
        if let Some(pid) = self.waiting.take() {
            let id = self.id;
            self.ctx.try_with_kernel(|k| k.store_abandon(id, pid));
        }
    }
}
