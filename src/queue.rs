// Priority queue ordered by (t, seq)
//
// The sequence number is a monotonic tie-breaker assigned under the queue
// lock, which makes the ordering total and reproducible: two events at the
// same step are always delivered in enqueue order. The payload is never
// part of the ordering key.
//
// The queue is shared behind an Arc so handlers can enqueue from inside
// `notify` while the engine is mid-step; insertion is serialised by a
// mutex and the clock is mirrored into an atomic so enqueue-time
// validation never touches the lock.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as MemOrdering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::SimError;
use crate::event::{Event, EventPayload, Step};
use crate::process::ProcessId;

/// A queued event together with the process that emitted it and, when
/// causal tracking is on, the event whose handler produced it.
#[derive(Debug)]
pub(crate) struct QueueEntry<E> {
    pub t: Step,
    pub seq: u64,
    pub event: Arc<Event<E>>,
    pub emitter: ProcessId,
    pub cause: Option<Arc<Event<E>>>,
}

// Entries compare on (t, seq) only.

impl<E> PartialEq for QueueEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.t == other.t && self.seq == other.seq
    }
}

impl<E> Eq for QueueEntry<E> {}

impl<E> PartialOrd for QueueEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for QueueEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.t, self.seq).cmp(&(other.t, other.seq))
    }
}

struct QueueState<E> {
    heap: BinaryHeap<Reverse<QueueEntry<E>>>,
    next_seq: u64,
}

/// Thread-safe event queue shared between the engine and the handles it
/// hands out to processes.
pub(crate) struct EventQueue<E> {
    state: Mutex<QueueState<E>>,
    /// Current simulation clock, mirrored here so enqueues can reject past
    /// events without taking the lock.
    now: AtomicU64,
    /// Upper bound on queued entries; 0 means unbounded.
    max_size: usize,
}

impl<E: EventPayload> EventQueue<E> {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            now: AtomicU64::new(0),
            max_size,
        }
    }

    /// The current simulation step.
    pub fn now(&self) -> Step {
        self.now.load(MemOrdering::Relaxed)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().heap.len()
    }

    /// Enqueue an event on behalf of `emitter`. Rejects events scheduled
    /// before the current clock and enforces the configured size bound.
    pub fn push(
        &self,
        event: Event<E>,
        emitter: ProcessId,
        cause: Option<Arc<Event<E>>>,
    ) -> Result<(), SimError> {
        let now = self.now();
        if event.t() < now {
            return Err(SimError::TimeInPast {
                name: event.name(),
                event_t: event.t(),
                now,
            });
        }

        let mut state = self.state.lock().unwrap();
        if self.max_size > 0 && state.heap.len() >= self.max_size {
            return Err(SimError::QueueFull { max: self.max_size });
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(
            event = event.name(),
            t = event.t(),
            seq,
            emitter = %emitter,
            cause = cause.as_ref().map(|c| c.name()),
            "queued event"
        );
        state.heap.push(Reverse(QueueEntry {
            t: event.t(),
            seq,
            event: Arc::new(event),
            emitter,
            cause,
        }));
        Ok(())
    }

    /// Pop every entry scheduled for the earliest pending step, in `seq`
    /// order. The first entry fixes the batch time and moves the clock;
    /// entries for later steps stay queued untouched. Returns an empty
    /// batch when the queue is drained.
    pub fn next_batch(&self) -> Vec<QueueEntry<E>> {
        let mut state = self.state.lock().unwrap();
        let mut batch = Vec::new();

        let batch_t = match state.heap.peek() {
            Some(Reverse(head)) => head.t,
            None => return batch,
        };
        if batch_t != self.now() {
            debug!(t = batch_t, "time moved");
            self.now.store(batch_t, MemOrdering::Relaxed);
        }

        while state
            .heap
            .peek()
            .map_or(false, |Reverse(head)| head.t == batch_t)
        {
            let Reverse(entry) = state.heap.pop().expect("peeked entry");
            batch.push(entry);
        }
        debug!(count = batch.len(), t = batch_t, "extracted batch");
        batch
    }
}
