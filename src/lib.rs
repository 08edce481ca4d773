//! Discrete-event simulation kernel
//!
//! A simulation is composed of independent [`Process`]es that exchange
//! immutable, time-stamped [`Event`]s through a central [`Engine`]. The
//! engine advances a logical clock in discrete steps, groups events
//! occurring at the same step into a batch, and delivers every event in
//! the batch to every registered process concurrently. Processes react by
//! acknowledging, ignoring, or emitting new future events, driving the
//! simulation forward until the queue drains or a caller-specified horizon
//! is reached.
//!
//! Architecture:
//! - `event`: the event wrapper, the `EventPayload` trait domain enums
//!   implement, and the two control variants the engine reacts to
//! - `process`: the `Process` trait, notification responses, and the
//!   handles/contexts through which processes enqueue events
//! - `queue`: the `(t, seq)`-ordered priority queue behind the clock
//! - `engine`: registry, dispatch matrix, concurrent broadcast with
//!   per-call timeouts, result collection, history and ledger
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lockstep::{
//!     Engine, Event, EventPayload, NotificationResponse, Process, ProcessContext, Step,
//! };
//!
//! #[derive(Clone, Debug, PartialEq, Eq, Hash)]
//! enum Ping {
//!     Echo { t: Step },
//! }
//!
//! impl EventPayload for Ping {
//!     fn t(&self) -> Step {
//!         match self {
//!             Ping::Echo { t } => *t,
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "Echo"
//!     }
//! }
//!
//! struct Listener;
//!
//! #[async_trait::async_trait]
//! impl Process<Ping> for Listener {
//!     fn process_name(&self) -> &'static str {
//!         "Listener"
//!     }
//!
//!     async fn notify(
//!         &self,
//!         event: &Event<Ping>,
//!         _ctx: &ProcessContext<Ping>,
//!     ) -> anyhow::Result<NotificationResponse> {
//!         match event {
//!             Event::Domain(Ping::Echo { .. }) => Ok(NotificationResponse::Ack),
//!             _ => Ok(NotificationResponse::NoAck),
//!         }
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), lockstep::SimError> {
//!     let mut engine = Engine::default();
//!     let listener: Arc<dyn Process<Ping>> = Arc::new(Listener);
//!     engine.register_process(Arc::clone(&listener))?;
//!     engine.add_event(&listener, Ping::Echo { t: 3 }.into())?;
//!     engine.run(None).await?;
//!     assert_eq!(engine.t(), 3);
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod event;
mod process;
mod queue;

pub use config::{EngineConfig, DEFAULT_BATCH_TIMEOUT};
pub use engine::{BatchEntry, Engine, EventLedger, EventRecord, EventResponses};
pub use error::SimError;
pub use event::{Event, EventPayload, Step};
pub use process::{
    EngineHandle, EngineInternalProcess, EngineLink, NotificationResponse, PredefinedEventAdder,
    Process, ProcessContext, ProcessId, SerializedProcess,
};
