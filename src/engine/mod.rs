//! The scheduler engine
//!
//! Owns the event queue, the logical clock, the process registry and the
//! optional observability records, and drives the run loop: pop the next
//! step's batch, broadcast every event in it to every registered process
//! concurrently, collect the acknowledgements, repeat until the queue
//! drains or the horizon is reached.
//!
//! Ordering guarantees:
//! - between steps, total order by `(t, seq)`;
//! - within a step, across processes, any interleaving;
//! - within a step, within one process, also any interleaving - see the
//!   module docs on [`crate::process`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::SimError;
use crate::event::{Event, EventPayload, Step};
use crate::process::{
    EngineHandle, EngineInternalProcess, NotificationResponse, Process, ProcessContext, ProcessId,
    UNASSIGNED_INSTANCE,
};
use crate::queue::{EventQueue, QueueEntry};

mod records;

pub use records::{BatchEntry, EventLedger, EventRecord, EventResponses};

/// A registry slot: the process object plus its resolved identity.
struct Registered<E: EventPayload> {
    process: Arc<dyn Process<E>>,
    id: ProcessId,
}

/// One cell of the dispatch matrix: an event of the current batch paired
/// with a live target process.
struct DispatchCall<E: EventPayload> {
    event: Arc<Event<E>>,
    emitter: ProcessId,
    cause: Option<Arc<Event<E>>>,
    target: Arc<dyn Process<E>>,
    target_id: ProcessId,
    ctx: ProcessContext<E>,
}

/// The simulation scheduler.
///
/// A host program registers processes, seeds events and awaits
/// [`run`](Engine::run); everything else happens through the handles and
/// contexts the engine injects into its processes.
pub struct Engine<E: EventPayload> {
    queue: Arc<EventQueue<E>>,
    registry: Vec<Registered<E>>,
    rng: SmallRng,
    batch_timeout: Option<Duration>,
    record_results: bool,
    record_event_history: bool,
    use_no_ack_cache: bool,
    track_causing_events: bool,
    no_ack_cache: HashSet<(&'static str, ProcessId)>,
    event_history: Vec<Vec<BatchEntry<E>>>,
    event_results: EventLedger<E>,
}

impl<E: EventPayload> Engine<E> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            queue: Arc::new(EventQueue::new(config.max_queue_size)),
            registry: Vec::new(),
            rng: SmallRng::seed_from_u64(config.rng_seed),
            batch_timeout: config.batch_timeout,
            record_results: config.record_results,
            record_event_history: config.record_event_history,
            use_no_ack_cache: config.use_no_ack_cache,
            track_causing_events: config.track_causing_events,
            no_ack_cache: HashSet::new(),
            event_history: Vec::new(),
            event_results: EventLedger::new(),
        }
    }

    /// The current simulation step. Non-decreasing across steps.
    pub fn t(&self) -> Step {
        self.queue.now()
    }

    /// Per-step batches delivered so far, in delivery order.
    pub fn event_history(&self) -> &[Vec<BatchEntry<E>>] {
        &self.event_history
    }

    /// The result ledger: every delivered event mapped to the responses it
    /// elicited.
    pub fn event_results(&self) -> &EventLedger<E> {
        &self.event_results
    }

    /// Identities of the currently registered processes, in registration
    /// order.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessId> {
        self.registry.iter().map(|slot| &slot.id)
    }

    /// The engine's seeded RNG. Hosts draw process seeds from here so a
    /// whole run reproduces from one `rng_seed`.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Add a process to the registry and inject its engine handle.
    ///
    /// A process that does not declare a stable instance identifier gets a
    /// random 128-bit one minted from the engine RNG. Returns the resolved
    /// identity, or [`SimError::DuplicateProcess`] if the `(name,
    /// instance)` pair is already live.
    pub fn register_process(
        &mut self,
        process: Arc<dyn Process<E>>,
    ) -> Result<ProcessId, SimError> {
        let instance = match process.instance_identifier() {
            Some(instance) => instance,
            None => self.rng.gen::<u128>().to_string(),
        };
        let id = ProcessId::new(process.process_name(), &instance);

        if self.registry.iter().any(|slot| slot.id == id) {
            return Err(SimError::DuplicateProcess { id });
        }

        process.attach(EngineHandle::new(Arc::clone(&self.queue), id.clone()));
        info!(process = %id, "registered");
        self.registry.push(Registered {
            process,
            id: id.clone(),
        });
        Ok(id)
    }

    /// Remove a process from the registry by object identity. Batches
    /// whose processing begins after removal no longer include it.
    pub fn unregister_process(&mut self, process: &Arc<dyn Process<E>>) {
        self.registry.retain(|slot| {
            if Arc::ptr_eq(&slot.process, process) {
                info!(process = %slot.id, "unregistered");
                false
            } else {
                true
            }
        });
    }

    /// Enqueue an event on behalf of `emitter`.
    ///
    /// The host-side counterpart of [`ProcessContext::emit`]: no handler
    /// encloses the call, so the event has no causal parent. Fails with
    /// [`SimError::TimeInPast`] if the event is scheduled before the
    /// current clock.
    pub fn add_event(
        &self,
        emitter: &Arc<dyn Process<E>>,
        event: Event<E>,
    ) -> Result<(), SimError> {
        let id = self
            .registry
            .iter()
            .find(|slot| Arc::ptr_eq(&slot.process, emitter))
            .map(|slot| slot.id.clone())
            .unwrap_or_else(|| {
                ProcessId::new(
                    emitter.process_name(),
                    emitter
                        .instance_identifier()
                        .as_deref()
                        .unwrap_or(UNASSIGNED_INSTANCE),
                )
            });
        self.queue.push(event, id, None)
    }

    /// Run the whole simulation: register the internal bootstrap process,
    /// seed [`Event::SimulationStarted`] and step until the queue drains
    /// or `until` is passed.
    pub async fn run(&mut self, until: Option<Step>) -> Result<(), SimError> {
        let bootstrap: Arc<dyn Process<E>> = Arc::new(EngineInternalProcess);
        self.register_process(Arc::clone(&bootstrap))?;
        self.add_event(&bootstrap, Event::SimulationStarted)?;
        while self.step(until).await? {}
        Ok(())
    }

    /// Execute one batch. Returns `Ok(false)` when the queue is exhausted
    /// or the popped batch falls beyond `until` (the clock still advances
    /// to the popped batch's step, as the batch has been consumed).
    pub async fn step(&mut self, until: Option<Step>) -> Result<bool, SimError> {
        let batch = self.queue.next_batch();
        if batch.is_empty() {
            info!("ending run: the queue of events is exhausted");
            return Ok(false);
        }
        let t = self.queue.now();
        if let Some(until) = until {
            if t > until {
                info!(t, until, "ending run: next events fall beyond the horizon");
                return Ok(false);
            }
        }

        self.unregister_batch_emitters(&batch);

        if self.record_event_history {
            self.event_history.push(
                batch
                    .iter()
                    .map(|entry| BatchEntry {
                        event: Arc::clone(&entry.event),
                        emitter: entry.emitter.clone(),
                        cause: entry.cause.clone(),
                    })
                    .collect(),
            );
        }

        let calls = self.dispatch_matrix(&batch);
        debug!(t, events = batch.len(), notifications = calls.len(), "dispatching batch");
        let results = self.broadcast(&calls).await;
        self.collect_results(calls, results)
    }

    /// Before dispatch, a `ProcessUnregistered` event removes its emitter,
    /// so a self-unregistering process is not a recipient of the very
    /// batch carrying its unregister event.
    fn unregister_batch_emitters(&mut self, batch: &[QueueEntry<E>]) {
        for entry in batch {
            if matches!(entry.event.as_ref(), Event::ProcessUnregistered { .. }) {
                self.registry.retain(|slot| {
                    if slot.id == entry.emitter {
                        info!(process = %slot.id, "unregistered");
                        false
                    } else {
                        true
                    }
                });
            }
        }
    }

    /// The Cartesian product of the live registry with the batch, minus
    /// pairs suppressed by the no-ack cache.
    fn dispatch_matrix(&self, batch: &[QueueEntry<E>]) -> Vec<DispatchCall<E>> {
        let mut calls = Vec::with_capacity(self.registry.len() * batch.len());
        for target in &self.registry {
            for entry in batch {
                if self.use_no_ack_cache
                    && self
                        .no_ack_cache
                        .contains(&(entry.event.name(), target.id.clone()))
                {
                    continue;
                }
                calls.push(DispatchCall {
                    event: Arc::clone(&entry.event),
                    emitter: entry.emitter.clone(),
                    cause: entry.cause.clone(),
                    target: Arc::clone(&target.process),
                    target_id: target.id.clone(),
                    ctx: ProcessContext::new(
                        EngineHandle::new(Arc::clone(&self.queue), target.id.clone()),
                        Arc::clone(&entry.event),
                        self.track_causing_events,
                    ),
                });
            }
        }
        calls
    }

    /// Notify every pair of the dispatch matrix concurrently, each call
    /// under its own timeout, and collect every outcome. A failure never
    /// cancels its peers.
    async fn broadcast(
        &self,
        calls: &[DispatchCall<E>],
    ) -> Vec<Result<NotificationResponse, SimError>> {
        let batch_timeout = self.batch_timeout;
        join_all(calls.iter().map(|call| async move {
            let notified = call.target.notify(&call.event, &call.ctx);
            let outcome = match batch_timeout {
                Some(limit) => match tokio::time::timeout(limit, notified).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return Err(SimError::HandlerTimeout {
                            target: call.target_id.clone(),
                            event: call.event.name(),
                            timeout: limit,
                        })
                    }
                },
                None => notified.await,
            };
            outcome.map_err(|reason| SimError::Handler {
                target: call.target_id.clone(),
                event: call.event.name(),
                reason,
            })
        }))
        .await
    }

    /// Walk the collected outcomes in dispatch order, feeding the no-ack
    /// cache and the ledger. Among failures the last one observed
    /// propagates; the ones it supersedes are logged here so none is
    /// silently dropped.
    fn collect_results(
        &mut self,
        calls: Vec<DispatchCall<E>>,
        results: Vec<Result<NotificationResponse, SimError>>,
    ) -> Result<bool, SimError> {
        let mut failure: Option<SimError> = None;
        for (call, result) in calls.iter().zip(results) {
            debug!(
                process = %call.target_id,
                event = call.event.name(),
                emitter = %call.emitter,
                ?result,
                "notification completed"
            );
            let response = match result {
                Ok(response) => response,
                Err(next) => {
                    if let Some(superseded) = failure.replace(next) {
                        error!(
                            error = ?superseded,
                            "handler failure superseded by a later one in the same batch; only the last propagates"
                        );
                    }
                    continue;
                }
            };

            if self.use_no_ack_cache && response == NotificationResponse::NoAck {
                self.no_ack_cache
                    .insert((call.event.name(), call.target_id.clone()));
            }
            if self.record_results {
                let key = EventRecord {
                    event: Arc::clone(&call.event),
                    emitter: call.emitter.clone(),
                    cause: call.cause.clone(),
                };
                self.event_results
                    .entry(key)
                    .or_default()
                    .insert(call.target_id.clone(), response);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }
}

impl<E: EventPayload> Default for Engine<E> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
