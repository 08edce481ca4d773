//! Processes - the units of behaviour within a simulation
//!
//! Every event of a step's batch is broadcast to every registered process
//! as a group of concurrent `notify` calls. That includes several events
//! arriving at the *same* process in one batch: those notifications
//! interleave freely, so a process guarding mutable state across await
//! points must bring its own mutual exclusion (or wrap itself in
//! [`SerializedProcess`]). Between batches execution is strictly
//! sequential.
//!
//! The suggested handler shape is to match the events the process cares
//! about and answer with an acknowledgement describing what was done:
//!
//! ```ignore
//! async fn notify(&self, event: &Event<Pond>, ctx: &ProcessContext<Pond>)
//!     -> anyhow::Result<NotificationResponse>
//! {
//!     match event {
//!         Event::Domain(Pond::FrogSpawned { t, pond_id, .. }) => {
//!             if *pond_id != self.pond_id {
//!                 return Ok(NotificationResponse::AckButIgnored);
//!             }
//!             ctx.emit(Pond::TadpoleCounted { t: t + 1 })?;
//!             Ok(NotificationResponse::Ack)
//!         }
//!         _ => Ok(NotificationResponse::NoAck),
//!     }
//! }
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SimError;
use crate::event::{Event, EventPayload, Step};
use crate::queue::EventQueue;

/// Instance identifier rendering used before the engine has assigned one.
pub(crate) const UNASSIGNED_INSTANCE: &str = "-1";

/// How a process responded to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationResponse {
    /// The event was handled and acted on.
    Ack,
    /// The event was decoded but not applicable (wrong identifier, stale,
    /// already satisfied, ...).
    AckButIgnored,
    /// The event was not recognised at all. With the no-ack cache enabled,
    /// the engine stops delivering this event kind to this process.
    NoAck,
}

/// Identity of a process within a running engine: the declared process
/// name plus an instance identifier unique per name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessId {
    name: Arc<str>,
    instance: Arc<str>,
}

impl ProcessId {
    pub(crate) fn new(name: &str, instance: &str) -> Self {
        Self {
            name: Arc::from(name),
            instance: Arc::from(instance),
        }
    }

    /// The declared process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instance identifier: either declared by the process or minted
    /// by the engine at registration.
    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process: {}, instance: {}", self.name, self.instance)
    }
}

/// A named, identified participant that reacts to events.
#[async_trait]
pub trait Process<E: EventPayload>: Send + Sync {
    /// The declared name of this process kind. Together with
    /// [`instance_identifier`](Process::instance_identifier) it forms the
    /// identity used by the ledger and the no-ack cache.
    fn process_name(&self) -> &'static str;

    /// Stable instance identifier, for processes where a predictable
    /// identity matters. Return `None` (the default) to have the engine
    /// mint a random 128-bit identifier from its seeded RNG at
    /// registration.
    fn instance_identifier(&self) -> Option<String> {
        None
    }

    /// Called once at registration with the handle for enqueueing events
    /// from outside a handler. The default implementation drops it;
    /// processes that only emit from inside `notify` never need it (the
    /// [`ProcessContext`] covers that path).
    fn attach(&self, handle: EngineHandle<E>) {
        let _ = handle;
    }

    /// React to an event.
    ///
    /// All notifications for a batch run concurrently, including multiple
    /// notifications of the same process: two events delivered together
    /// may complete in either order. The engine promises concurrency, not
    /// mutual exclusion.
    ///
    /// Returning an error fails the step after the rest of the batch has
    /// completed; see [`SimError::Handler`].
    async fn notify(
        &self,
        event: &Event<E>,
        ctx: &ProcessContext<E>,
    ) -> anyhow::Result<NotificationResponse>;
}

/// Enqueue callback handed to a process at registration.
///
/// Cloneable and usable from any task; events added here carry the owning
/// process as emitter and no causal parent (there is no enclosing
/// handler).
#[derive(Clone)]
pub struct EngineHandle<E: EventPayload> {
    queue: Arc<EventQueue<E>>,
    emitter: ProcessId,
}

impl<E: EventPayload> EngineHandle<E> {
    pub(crate) fn new(queue: Arc<EventQueue<E>>, emitter: ProcessId) -> Self {
        Self { queue, emitter }
    }

    /// The current simulation step.
    pub fn t(&self) -> Step {
        self.queue.now()
    }

    /// Enqueue a future event attributed to the owning process.
    pub fn add_event(&self, event: impl Into<Event<E>>) -> Result<(), SimError> {
        self.queue.push(event.into(), self.emitter.clone(), None)
    }

    pub(crate) fn push_caused(
        &self,
        event: Event<E>,
        cause: Option<Arc<Event<E>>>,
    ) -> Result<(), SimError> {
        self.queue.push(event, self.emitter.clone(), cause)
    }
}

/// Slot for the [`EngineHandle`] a process receives at registration.
///
/// Embed one in a process that needs to enqueue events outside `notify`,
/// wire it up from [`Process::attach`], and call
/// [`add_event`](EngineLink::add_event). Before registration the slot is
/// empty and adding events fails with [`SimError::NotRegistered`].
pub struct EngineLink<E: EventPayload> {
    handle: OnceLock<EngineHandle<E>>,
}

impl<E: EventPayload> EngineLink<E> {
    pub fn new() -> Self {
        Self {
            handle: OnceLock::new(),
        }
    }

    /// Store the handle received in [`Process::attach`]. A second attach
    /// (e.g. re-registration after an unregister) keeps the original
    /// handle; both point at the same queue.
    pub fn attach(&self, handle: EngineHandle<E>) {
        let _ = self.handle.set(handle);
    }

    /// Enqueue a future event attributed to the owning process.
    pub fn add_event(&self, event: impl Into<Event<E>>) -> Result<(), SimError> {
        match self.handle.get() {
            Some(handle) => handle.add_event(event),
            None => Err(SimError::NotRegistered),
        }
    }
}

impl<E: EventPayload> Default for EngineLink<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Context provided to a single `notify` invocation.
///
/// Knows which process is handling which event, so events emitted from
/// inside the handler are attributed to the right emitter and - when
/// causal tracking is enabled - to the right causal parent.
pub struct ProcessContext<E: EventPayload> {
    handle: EngineHandle<E>,
    current: Arc<Event<E>>,
    track_causes: bool,
}

impl<E: EventPayload> ProcessContext<E> {
    pub(crate) fn new(
        handle: EngineHandle<E>,
        current: Arc<Event<E>>,
        track_causes: bool,
    ) -> Self {
        Self {
            handle,
            current,
            track_causes,
        }
    }

    /// The current simulation step.
    pub fn t(&self) -> Step {
        self.handle.t()
    }

    /// The event this notification is for.
    pub fn current_event(&self) -> &Event<E> {
        &self.current
    }

    /// Enqueue a future event attributed to the handling process. With
    /// causal tracking enabled the event being handled is recorded as the
    /// new event's cause.
    pub fn emit(&self, event: impl Into<Event<E>>) -> Result<(), SimError> {
        let cause = if self.track_causes {
            Some(Arc::clone(&self.current))
        } else {
            None
        };
        self.handle.push_caused(event.into(), cause)
    }
}

/// Engine-owned process registered by `run`. Its sole duty is to be the
/// emitter of [`Event::SimulationStarted`]; it answers `NoAck` to every
/// inbound event.
pub struct EngineInternalProcess;

#[async_trait]
impl<E: EventPayload> Process<E> for EngineInternalProcess {
    fn process_name(&self) -> &'static str {
        "EngineInternalProcess"
    }

    async fn notify(
        &self,
        _event: &Event<E>,
        _ctx: &ProcessContext<E>,
    ) -> anyhow::Result<NotificationResponse> {
        Ok(NotificationResponse::NoAck)
    }
}

/// Seeds a fixed list of events when the simulation starts, then
/// unregisters itself to avoid any further notification overhead.
pub struct PredefinedEventAdder<E> {
    name: String,
    events: Vec<Event<E>>,
}

impl<E: EventPayload> PredefinedEventAdder<E> {
    pub fn new<I>(predefined_events: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Event<E>>,
    {
        Self {
            name: name.into(),
            events: predefined_events.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl<E: EventPayload> Process<E> for PredefinedEventAdder<E> {
    fn process_name(&self) -> &'static str {
        "PredefinedEventAdder"
    }

    fn instance_identifier(&self) -> Option<String> {
        Some(self.name.clone())
    }

    async fn notify(
        &self,
        event: &Event<E>,
        ctx: &ProcessContext<E>,
    ) -> anyhow::Result<NotificationResponse> {
        match event {
            Event::SimulationStarted => {
                for event in &self.events {
                    ctx.emit(event.clone())?;
                }
                ctx.emit(Event::ProcessUnregistered { t: ctx.t() })?;
                Ok(NotificationResponse::Ack)
            }
            _ => Ok(NotificationResponse::NoAck),
        }
    }
}

/// Wraps a process so its notifications are handled one at a time, in
/// arrival order.
///
/// The engine delivers every event of a batch concurrently, several of
/// them possibly to the same process. For processes whose state cannot
/// tolerate interleaving, this wrapper takes a fair per-process lock
/// around `notify`.
pub struct SerializedProcess<P> {
    inner: P,
    guard: Mutex<()>,
}

impl<P> SerializedProcess<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            guard: Mutex::new(()),
        }
    }

    /// The wrapped process.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<E: EventPayload, P: Process<E>> Process<E> for SerializedProcess<P> {
    fn process_name(&self) -> &'static str {
        self.inner.process_name()
    }

    fn instance_identifier(&self) -> Option<String> {
        self.inner.instance_identifier()
    }

    fn attach(&self, handle: EngineHandle<E>) {
        self.inner.attach(handle);
    }

    async fn notify(
        &self,
        event: &Event<E>,
        ctx: &ProcessContext<E>,
    ) -> anyhow::Result<NotificationResponse> {
        let _held = self.guard.lock().await;
        self.inner.notify(event, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct Blip {
        t: Step,
    }

    impl EventPayload for Blip {
        fn t(&self) -> Step {
            self.t
        }

        fn name(&self) -> &'static str {
            "Blip"
        }
    }

    fn context(queue: &Arc<EventQueue<Blip>>, current: Event<Blip>) -> ProcessContext<Blip> {
        ProcessContext::new(
            EngineHandle::new(Arc::clone(queue), ProcessId::new("Adder", "seed")),
            Arc::new(current),
            false,
        )
    }

    #[test]
    fn process_id_renders_name_and_instance() {
        let id = ProcessId::new("ChargingStation", "7");
        assert_eq!(id.to_string(), "process: ChargingStation, instance: 7");
        assert_eq!(id.name(), "ChargingStation");
        assert_eq!(id.instance(), "7");
    }

    #[test]
    fn link_rejects_events_before_attachment() {
        let link: EngineLink<Blip> = EngineLink::new();
        let err = link.add_event(Blip { t: 1 }).unwrap_err();
        assert!(matches!(err, SimError::NotRegistered));
    }

    #[test]
    fn link_forwards_events_once_attached() {
        let queue = Arc::new(EventQueue::new(0));
        let link: EngineLink<Blip> = EngineLink::new();
        link.attach(EngineHandle::new(
            Arc::clone(&queue),
            ProcessId::new("Linked", "1"),
        ));
        link.add_event(Blip { t: 2 }).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn adder_seeds_events_and_unregisters_on_simulation_started() {
        let queue = Arc::new(EventQueue::new(0));
        let adder = PredefinedEventAdder::new(vec![Blip { t: 2 }, Blip { t: 3 }], "seed");
        let ctx = context(&queue, Event::SimulationStarted);

        let response = adder.notify(&Event::SimulationStarted, &ctx).await.unwrap();
        assert_eq!(response, NotificationResponse::Ack);

        // the predefined events plus the self-unregistration
        assert_eq!(queue.len(), 3);
        let first = queue.next_batch();
        assert_eq!(first.len(), 1);
        assert!(matches!(
            first[0].event.as_ref(),
            Event::ProcessUnregistered { t: 0 }
        ));
    }

    #[tokio::test]
    async fn adder_ignores_events_other_than_simulation_started() {
        let queue = Arc::new(EventQueue::new(0));
        let adder: PredefinedEventAdder<Blip> = PredefinedEventAdder::new(Vec::<Blip>::new(), "seed");
        let event: Event<Blip> = Blip { t: 1 }.into();
        let ctx = context(&queue, event.clone());

        let response = adder.notify(&event, &ctx).await.unwrap();
        assert_eq!(response, NotificationResponse::NoAck);
        assert_eq!(queue.len(), 0);
    }
}
