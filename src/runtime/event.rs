use crate::{runtime::SimError, time::SimTime};
use fxhash::FxHashSet;
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt::{Debug, Display},
};

///
/// A handle to a scheduled event, used for cancellation.
///
/// Handles wrap the insertion sequence of an event, which is unique
/// per [`EventQueue`].
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(pub(crate) u64);

impl EventHandle {
    /// The insertion sequence of the referenced event.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl Display for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event#{}", self.0)
    }
}

///
/// A scheduled event, carrying an arbitrary payload.
///
pub struct EventNode<T> {
    /// The time the event is due.
    pub time: SimTime,
    /// The insertion sequence, used as a tie-break for equal times.
    pub seq: u64,
    /// The attached continuation.
    pub payload: T,
}

impl<T> EventNode<T> {
    fn key(&self) -> (SimTime, u64) {
        (self.time, self.seq)
    }
}

impl<T> PartialEq for EventNode<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for EventNode<T> {}

impl<T> PartialOrd for EventNode<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EventNode<T> {
    // BinaryHeap is a max-heap, the earliest (time, seq) must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl<T> Debug for EventNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNode")
            .field("time", &self.time)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

///
/// The future event set of a simulation, ordered by `(time, sequence)`.
///
/// Events due at the time of the most recently fetched event bypass the
/// heap and go to a FIFO zero-queue. Fetching compares the heads of both
/// structures, so the `(time, sequence)` order holds across them.
///
/// Cancellation is lazy: cancelled events stay in their structure until
/// they reach the front, where they are discarded.
///
pub struct EventQueue<T> {
    heap: BinaryHeap<EventNode<T>>,
    zero_queue: VecDeque<EventNode<T>>,
    pending: FxHashSet<u64>,

    next_seq: u64,
    last_event_simtime: SimTime,
}

impl<T> EventQueue<T> {
    ///
    /// Creates a new empty queue, with the clock starting at `start_time`.
    ///
    #[must_use]
    pub fn new(start_time: SimTime) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(64),
            zero_queue: VecDeque::with_capacity(32),
            pending: FxHashSet::default(),

            next_seq: 0,
            last_event_simtime: start_time,
        }
    }

    /// The number of pending (not dispatched, not cancelled) events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The number of handles issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next_seq
    }

    ///
    /// Inserts an event due at `time`.
    ///
    /// The caller guarantees that `time` is valid and not before the
    /// time of the last fetched event.
    ///
    pub fn add(&mut self, time: SimTime, payload: T) -> EventHandle {
        debug_assert!(time.is_valid(), "event time must be a number");
        debug_assert!(
            time >= self.last_event_simtime,
            "Sorry we cannot timetravel yet"
        );

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq);

        let node = EventNode { time, seq, payload };
        if time == self.last_event_simtime {
            self.zero_queue.push_back(node);
        } else {
            self.heap.push(node);
        }

        EventHandle(seq)
    }

    ///
    /// Cancels a pending event.
    ///
    /// Returns `Ok(true)` if the event was pending, and `Ok(false)` if it was
    /// already dispatched or cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownHandle`] if the handle was never issued by this queue.
    ///
    pub fn cancel(&mut self, handle: EventHandle) -> Result<bool, SimError> {
        if handle.0 >= self.next_seq {
            return Err(SimError::UnknownHandle(handle.0));
        }
        Ok(self.pending.remove(&handle.0))
    }

    /// Whether the referenced event is still waiting to be dispatched.
    #[must_use]
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.pending.contains(&handle.0)
    }

    /// Returns the time of the next pending event.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        self.purge();
        match (self.zero_queue.front(), self.heap.peek()) {
            (Some(z), Some(h)) => Some(z.time.min(h.time)),
            (Some(z), None) => Some(z.time),
            (None, Some(h)) => Some(h.time),
            (None, None) => None,
        }
    }

    ///
    /// Removes the earliest pending event by `(time, sequence)`.
    ///
    pub fn fetch_next(&mut self) -> Option<EventNode<T>> {
        self.purge();

        let take_zero = match (self.zero_queue.front(), self.heap.peek()) {
            (Some(z), Some(h)) => z.key() < h.key(),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };

        let node = if take_zero {
            self.zero_queue.pop_front()?
        } else {
            self.heap.pop()?
        };

        self.pending.remove(&node.seq);
        self.last_event_simtime = node.time;
        Some(node)
    }

    fn purge(&mut self) {
        while let Some(front) = self.zero_queue.front() {
            if self.pending.contains(&front.seq) {
                break;
            }
            self.zero_queue.pop_front();
        }
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<T> Debug for EventQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("issued", &self.next_seq)
            .field("last_event_simtime", &self.last_event_simtime)
            .finish()
    }
}
