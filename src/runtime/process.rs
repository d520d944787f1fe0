//!
//! Cooperative processes driven by the simulator.
//!
//! A process is an `async` block (or any other future) that is polled
//! only when one of its events is dispatched. Suspension happens at the
//! `.await` of a [`Sleep`], a resource acquisition or a store operation.
//!

use super::{Continuation, EventHandle, Kernel, SimContext, SimError};
use crate::sync::{Blocker, ResourceId};
use futures::future::LocalBoxFuture;
use pin_project_lite::pin_project;
use std::{
    any::Any,
    fmt::Display,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
};

///
/// A simulation unique identifier of a process.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessId(pub(crate) u64);

impl ProcessId {
    /// The raw numeric id.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Process#{}", self.0)
    }
}

/// The lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProcessState {
    /// Waiting for its start event, or granted and waiting to be resumed.
    Runnable,
    /// Sleeping until a resume event fires.
    Suspended,
    /// Waiting in the queue of a resource or store.
    Blocked,
    /// Finished, faulted or killed.
    Terminated,
}

/// A flag, that defines how the simulation acts if a process panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnwindBehaviour {
    /// Panics are caught. The panicking process is terminated and the
    /// fault is reported by the next call to `run`.
    #[default]
    Catch,
    /// Panics unwind through the simulator into the caller of `run`.
    Unwind,
}

///
/// The output of a process entry point.
///
/// Implemented for `()` and for `Result<(), E>` with a displayable `E`,
/// so process bodies may use `?` on simulator operations.
///
pub trait ProcessOutput {
    /// Converts the output into an outcome, with a rendered fault on error.
    ///
    /// # Errors
    ///
    /// Returns the rendered fault if the process terminated abnormally.
    fn into_outcome(self) -> Result<(), String>;
}

impl ProcessOutput for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: Display> ProcessOutput for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

pub(crate) type Task = LocalBoxFuture<'static, Result<(), String>>;

pin_project! {
    /// Wraps a process body, converting its output and, if configured,
    /// catching panics raised while polling it.
    pub(crate) struct Guarded<F> {
        #[pin]
        inner: F,
        unwind: UnwindBehaviour,
    }
}

impl<F> Guarded<F> {
    pub(crate) fn new(inner: F, unwind: UnwindBehaviour) -> Self {
        Self { inner, unwind }
    }
}

impl<F> Future for Guarded<F>
where
    F: Future,
    F::Output: ProcessOutput,
{
    type Output = Result<(), String>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.unwind {
            UnwindBehaviour::Unwind => this.inner.poll(cx).map(ProcessOutput::into_outcome),
            UnwindBehaviour::Catch => {
                let inner = this.inner;
                match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
                    Ok(poll) => poll.map(ProcessOutput::into_outcome),
                    Err(payload) => Poll::Ready(Err(panic_message(payload.as_ref()))),
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

pub(crate) struct ProcessRecord {
    pub(crate) name: Option<String>,
    pub(crate) state: ProcessState,
    pub(crate) pending: Option<EventHandle>,
    pub(crate) held: Vec<ResourceId>,
    pub(crate) blocker: Option<Blocker>,
    pub(crate) killed: bool,
    pub(crate) task: Option<Task>,
}

impl ProcessRecord {
    pub(crate) fn new(name: Option<String>, task: Task) -> Self {
        Self {
            name,
            state: ProcessState::Runnable,
            pending: None,
            held: Vec::new(),
            blocker: None,
            killed: false,
            task: Some(task),
        }
    }
}

impl Kernel {
    pub(crate) fn spawn(
        &mut self,
        name: Option<String>,
        delay: f64,
        task: Task,
    ) -> Result<ProcessId, SimError> {
        if delay.is_nan() || delay < 0.0 {
            return Err(SimError::InvalidDuration(delay));
        }

        let pid = ProcessId(self.next_pid);
        let handle = self.schedule_at(self.now + delay, Continuation::Resume(pid))?;
        self.next_pid += 1;

        let mut record = ProcessRecord::new(name, task);
        record.pending = Some(handle);
        self.processes.insert(pid, record);

        tracing::debug!(%pid, start = %(self.now + delay), "spawned process");
        Ok(pid)
    }

    /// Suspends the running process for `duration` time units.
    pub(crate) fn suspend_current(&mut self, duration: f64) -> Result<EventHandle, SimError> {
        if duration.is_nan() || duration < 0.0 {
            return Err(SimError::InvalidDuration(duration));
        }
        let pid = self.current.ok_or(SimError::NoProcessContext)?;
        let handle = self.schedule_at(self.now + duration, Continuation::Resume(pid))?;

        if let Some(record) = self.processes.get_mut(&pid) {
            record.pending = Some(handle);
            record.state = ProcessState::Suspended;
        }
        Ok(handle)
    }

    /// Schedules the resumption of a process at the current time.
    pub(crate) fn wake(&mut self, pid: ProcessId) {
        let handle = self.queue.add(self.now, Continuation::Resume(pid));
        if let Some(record) = self.processes.get_mut(&pid) {
            record.pending = Some(handle);
            record.blocker = None;
            record.state = ProcessState::Runnable;
        }
    }

    /// Withdraws the resume event of a sleep that was dropped before it fired.
    pub(crate) fn cancel_resume(&mut self, handle: EventHandle) {
        if !self.queue.is_pending(handle) {
            return;
        }
        let _ = self.queue.cancel(handle);
        if let Some(record) = self.current.and_then(|pid| self.processes.get_mut(&pid)) {
            if record.pending == Some(handle) {
                record.pending = None;
            }
        }
        tracing::trace!(%handle, "cancelled abandoned sleep");
    }

    pub(crate) fn process_state(&self, pid: ProcessId) -> Result<ProcessState, SimError> {
        match self.processes.get(&pid) {
            Some(record) if record.killed => Ok(ProcessState::Terminated),
            Some(record) => Ok(record.state),
            None if pid.0 < self.next_pid => Ok(ProcessState::Terminated),
            None => Err(SimError::UnknownProcess(pid)),
        }
    }

    ///
    /// Removes a process from the arena and performs its cleanup:
    /// the pending event is cancelled, a wait queue entry is removed and
    /// held resources are released in reverse acquisition order.
    ///
    /// The removed record is returned so that the caller can drop the
    /// task once the kernel is no longer borrowed.
    ///
    pub(crate) fn terminate(
        &mut self,
        pid: ProcessId,
        outcome: Result<(), String>,
    ) -> Option<ProcessRecord> {
        let mut record = self.processes.remove(&pid)?;

        if let Some(handle) = record.pending.take() {
            let _ = self.queue.cancel(handle);
        }

        match record.blocker.take() {
            Some(Blocker::Resource(rid)) => self.resource_renege(rid, pid),
            Some(Blocker::Store(sid)) => self.store_renege(sid, pid),
            None => {}
        }

        let held = std::mem::take(&mut record.held);
        for rid in held.into_iter().rev() {
            if let Err(e) = self.resource_release(rid, pid) {
                tracing::error!(%pid, "cleanup release failed: {e}");
            }
        }

        record.state = ProcessState::Terminated;
        match outcome {
            Ok(()) => tracing::debug!(%pid, "process terminated"),
            Err(reason) => {
                tracing::warn!(%pid, "process faulted: {reason}");
                self.faults.push(super::ProcessFault {
                    process: Some(pid),
                    time: self.now,
                    reason,
                });
            }
        }
        Some(record)
    }
}

///
/// A handle to a spawned process.
///
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub(crate) id: ProcessId,
    pub(crate) ctx: SimContext,
}

impl ProcessHandle {
    /// The id of the process.
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// The name given at spawn time, if any.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.ctx
            .with_kernel(|k| k.processes.get(&self.id).and_then(|r| r.name.clone()))
            .ok()
            .flatten()
    }

    /// The current lifecycle state. A dropped simulator reports `Terminated`.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.ctx
            .with_kernel(|k| k.process_state(self.id))
            .and_then(|r| r)
            .unwrap_or(ProcessState::Terminated)
    }

    /// Whether the process has not yet terminated.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state() != ProcessState::Terminated
    }

    ///
    /// Terminates the process, see [`SimContext::kill`].
    ///
    /// # Errors
    ///
    /// Fails if the simulator no longer exists.
    pub fn kill(&self) -> Result<bool, SimError> {
        self.ctx.kill(self.id)
    }
}

///
/// Future returned by [`SimContext::sleep`].
///
/// The first poll validates the duration and schedules the resume event,
/// later polls complete once that event was dispatched. Dropping a sleep
/// before it completes cancels its resume event.
///
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Sleep {
    ctx: SimContext,
    duration: f64,
    handle: Option<EventHandle>,
}

impl Sleep {
    pub(crate) fn new(ctx: SimContext, duration: f64) -> Self {
        Self {
            ctx,
            duration,
            handle: None,
        }
    }

    /// The requested duration.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

impl Future for Sleep {
    type Output = Result<(), SimError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let duration = self.duration;
        let handle = self.handle;
        let result = self.ctx.with_kernel(|k| match handle {
            None => k.suspend_current(duration).map(Some),
            Some(handle) if k.queue.is_pending(handle) => Ok(Some(handle)),
            Some(_) => Ok(None),
        });

        match result.and_then(|r| r) {
            Ok(Some(handle)) => {
                self.handle = Some(handle);
                Poll::Pending
            }
            ready => {
                self.handle = None;
                Poll::Ready(ready.map(|_| ()))
            }
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.ctx.try_with_kernel(|k| k.cancel_resume(handle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    #[test]
    fn process_output_conversion() {
        assert_eq!(().into_outcome(), Ok(()));
        assert_eq!(Ok::<(), String>(()).into_outcome(), Ok(()));
        assert_eq!(
            Err::<(), _>(SimError::NoProcessContext).into_outcome(),
            Err("operation requires a running process".to_string())
        );
    }

    #[test]
    fn guarded_catches_panics() {
        let mut fut = Box::pin(Guarded::new(
            async {
                panic!("on purpose");
                #[allow(unreachable_code)]
                ()
            },
            UnwindBehaviour::Catch,
        ));
        let mut cx = Context::from_waker(noop_waker_ref());
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err("panicked: on purpose".to_string()))
        );
    }

    #[test]
    fn guarded_forwards_errors() {
        let mut fut = Box::pin(Guarded::new(
            async { Err::<(), _>("failed") },
            UnwindBehaviour::Unwind,
        ));
        let mut cx = Context::from_waker(noop_waker_ref());
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err("failed".to_string()))
        );
    }

    #[test]
    fn process_id_display() {
        assert_eq!(ProcessId(7).to_string(), "Process#7");
        assert_eq!(ProcessId(7).as_u64(), 7);
    }
}
