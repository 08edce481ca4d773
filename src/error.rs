//! Errors surfaced by the engine
//!
//! Synchronous failures (`TimeInPast`, `DuplicateProcess`, `NotRegistered`,
//! `QueueFull`) come straight out of the call that caused them. Handler
//! failures are collected together with their peers' results at the end of
//! a step: the last one observed propagates out of `step`/`run`, the rest
//! are logged at error level with full context.

use std::time::Duration;

use thiserror::Error;

use crate::event::Step;
use crate::process::ProcessId;

/// Everything that can go wrong inside the simulation kernel.
#[derive(Debug, Error)]
pub enum SimError {
    /// An event was scheduled before the current clock.
    #[error("cannot schedule {name} at t={event_t}: the clock is already at t={now}")]
    TimeInPast {
        /// Declared name of the rejected event.
        name: &'static str,
        /// Step the event asked for.
        event_t: Step,
        /// Engine clock at the time of the call.
        now: Step,
    },

    /// A process with the same `(name, instance)` pair is already
    /// registered.
    #[error("{id} already exists within the simulation, cannot register twice")]
    DuplicateProcess {
        /// The colliding identity.
        id: ProcessId,
    },

    /// A process tried to add an event before the engine attached its
    /// handle at registration.
    #[error("engine handle not attached: register the process before adding events")]
    NotRegistered,

    /// The configured `max_queue_size` bound was reached.
    #[error("event queue is full ({max} entries)")]
    QueueFull {
        /// The configured bound.
        max: usize,
    },

    /// A `notify` call exceeded the per-call batch timeout. Peer calls in
    /// the same batch are unaffected.
    #[error("{target} took longer than {timeout:?} to handle {event}")]
    HandlerTimeout {
        /// The process whose handler timed out.
        target: ProcessId,
        /// Declared name of the event being handled.
        event: &'static str,
        /// The configured per-call budget.
        timeout: Duration,
    },

    /// A handler returned an error.
    #[error("{target} failed while handling {event}: {reason}")]
    Handler {
        /// The process whose handler failed.
        target: ProcessId,
        /// Declared name of the event being handled.
        event: &'static str,
        /// The handler's own error.
        reason: anyhow::Error,
    },
}
