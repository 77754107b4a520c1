//! Delivery of queued clock events to the authoritative store.
//!
//! - [`EventStore`]: the store interface, with a local SQLite adapter
//!   ([`SqliteEventStore`]) and an HTTP adapter ([`HttpEventStore`])
//! - [`SyncEngine`]: single-flight, order-preserving queue drain and its
//!   trigger loop
//! - [`Connectivity`] and [`ProbeMonitor`]: the online/offline signal
//! - [`ClockService`]: rule-checked clock actions staged through the queue

mod clock;
mod connectivity;
mod engine;
mod http;
mod local;
mod store;

#[cfg(test)]
mod testing;

pub use clock::{ClockError, ClockService, PunchReceipt};
pub use connectivity::{Connectivity, ProbeMonitor};
pub use engine::{MIN_TICK_PERIOD, SyncEngine, SyncHandle, SyncOutcome, SyncSettings, SyncStatus};
pub use http::{DEFAULT_TIMEOUT, HttpEventStore};
pub use local::SqliteEventStore;
pub use store::{DeliveryError, EventStore, SubmitReceipt};
