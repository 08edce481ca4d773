// Events that flow between processes through the engine's queue
//
// Everything the engine moves is an `Event<E>`: either one of the two
// control variants the engine itself reacts to, or a domain event defined
// by the simulation as a single tagged enum implementing `EventPayload`.
// Events are plain values: equality and hashing derive from the full field
// tuple, and there is no mutation surface after construction.

use std::fmt;
use std::hash::Hash;

/// Logical simulation time: a non-negative integer step.
///
/// Steps are abstract ticks. Anything mapping them onto calendar time lives
/// outside the kernel.
pub type Step = u64;

/// The domain payload carried by [`Event::Domain`].
///
/// Model the events of a simulation as one enum and implement this trait on
/// it; handlers then match on the variants they understand. `name` is the
/// declared identifier of the concrete variant and keys the no-ack cache,
/// so it must be stable across runs.
pub trait EventPayload: Clone + fmt::Debug + Eq + Hash + Send + Sync + 'static {
    /// The step at which the event is scheduled to be delivered.
    fn t(&self) -> Step;

    /// The declared name of the concrete variant.
    fn name(&self) -> &'static str;
}

/// An immutable, time-stamped message delivered to every registered
/// process of the batch for its step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event<E> {
    /// Emitted once per run by the engine's internal process, at `t = 0`,
    /// before the first step.
    SimulationStarted,

    /// When popped from the queue, removes the *emitting* process from the
    /// registry before the batch is broadcast. It is never delivered back
    /// to its emitter.
    ProcessUnregistered {
        /// Step at which the unregistration takes effect.
        t: Step,
    },

    /// A domain event defined by the simulation.
    Domain(E),
}

impl<E: EventPayload> Event<E> {
    /// The step at which this event is scheduled to be delivered.
    pub fn t(&self) -> Step {
        match self {
            Event::SimulationStarted => 0,
            Event::ProcessUnregistered { t } => *t,
            Event::Domain(payload) => payload.t(),
        }
    }

    /// The declared name of the concrete variant.
    pub fn name(&self) -> &'static str {
        match self {
            Event::SimulationStarted => "SimulationStarted",
            Event::ProcessUnregistered { .. } => "ProcessUnregistered",
            Event::Domain(payload) => payload.name(),
        }
    }
}

impl<E: EventPayload> From<E> for Event<E> {
    fn from(payload: E) -> Self {
        Event::Domain(payload)
    }
}
