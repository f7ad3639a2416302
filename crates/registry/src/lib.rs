//! saturn timer registry
//!
//! The in-memory core of saturn: a concurrent map from event identifiers to
//! live, cancellable, time-based actions. Clients register a named event with
//! a timeout and a payload; when the timeout elapses the payload is handed to
//! a [`DeliverEvent`] implementation (in production, a webhook POST). Pending
//! events can be queried, cancelled, or extended until they fire.
//!
//! ## Design
//!
//! - All map state is guarded by a single `tokio::sync::Mutex`. Registry
//!   operations never perform I/O while the lock is held; delivery happens
//!   strictly after the fired record has been removed and the lock released.
//! - Each registered event is backed by one spawned task sleeping until the
//!   record's deadline. Cancellation aborts the task under the lock; extension
//!   moves the deadline under the lock, and the sleeping task re-checks the
//!   current record when it wakes. The delivered payload and `time_initiated`
//!   therefore always reflect the most recent successful extension.
//! - Every timer task is tracked so [`TimerRegistry::shutdown`] can drain
//!   in-flight delivery calls before the process exits.

mod config;
mod delivery;
mod registry;

pub use config::RegistryConfig;
pub use delivery::{DeliverEvent, DeliveryError, FiredEvent, WebhookClient};
pub use registry::{CancelOutcome, ExtendOutcome, RegisterOutcome, TimerRegistry};
