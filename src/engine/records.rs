//! Post-run observability: the event history and the result ledger
//!
//! Both are append-only and kept out of the hot path when disabled.
//! Visualisation adaptors consume the ledger as their sole input: each
//! entry gives an `emitter -> target` edge labelled with the event name,
//! filtered by the responses the adaptor cares about.

use std::collections::HashMap;
use std::sync::Arc;

use crate::event::Event;
use crate::process::{NotificationResponse, ProcessId};

/// One delivered event as the history remembers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry<E> {
    /// The event itself.
    pub event: Arc<Event<E>>,
    /// The process that enqueued it.
    pub emitter: ProcessId,
    /// The event whose handler enqueued it, when causal tracking is on.
    pub cause: Option<Arc<Event<E>>>,
}

/// Ledger key: an event together with its emitter and causal parent. With
/// causal tracking disabled the cause is uniformly `None` and the key
/// degenerates to the plain `(event, emitter)` shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventRecord<E> {
    pub event: Arc<Event<E>>,
    pub emitter: ProcessId,
    pub cause: Option<Arc<Event<E>>>,
}

/// The responses one delivered event elicited, keyed by target process.
pub type EventResponses = HashMap<ProcessId, NotificationResponse>;

/// Mapping from delivered events to the responses they elicited.
pub type EventLedger<E> = HashMap<EventRecord<E>, EventResponses>;
