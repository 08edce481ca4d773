//! Engine configuration
//!
//! Plain construction parameters with built-in defaults. The kernel has no
//! CLI, environment variables or config files; a host program builds an
//! `EngineConfig` (or takes `Default`) and hands it to the engine.

use std::time::Duration;

/// Default per-notification budget within a batch.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Core simulation parameters and performance switches.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seed for the engine RNG, used to mint process instance identifiers.
    /// Runs with the same seed, the same registration order and no
    /// external randomness in handlers reproduce bit-identical history and
    /// results.
    pub rng_seed: u64,

    /// Upper bound on queued events; 0 means unbounded. Enqueues beyond
    /// the bound fail fast with `QueueFull`.
    pub max_queue_size: usize,

    /// How long a single `notify` call may run within a batch before it
    /// fails with `HandlerTimeout`. `None` disables the limit.
    pub batch_timeout: Option<Duration>,

    /// Record every process response in the result ledger. Turn off for
    /// long runs that never introspect results.
    pub record_results: bool,

    /// Append each step's batch to the event history.
    pub record_event_history: bool,

    /// Stop notifying a process of an event kind once it has answered
    /// `NoAck` to it.
    pub use_no_ack_cache: bool,

    /// Record the event being handled as the cause of every event a
    /// handler emits. Useful for downstream visualisation, not required
    /// functionally.
    pub track_causing_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_seed: 0,
            max_queue_size: 0,
            batch_timeout: Some(DEFAULT_BATCH_TIMEOUT),
            record_results: true,
            record_event_history: true,
            use_no_ack_cache: false,
            track_causing_events: false,
        }
    }
}
