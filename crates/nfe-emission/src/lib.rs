//! # nfe-emission — Emission Orchestration for the NF-e Engine
//!
//! The top-level state machine of the engine. A caller hands a populated,
//! tax-calculated document to the [`Emitter`]; the orchestrator stamps
//! the access key, assembles and signs the canonical XML, gates
//! submission on a cached availability probe, interprets the authority's
//! answer, and parks the document in the contingency queue when the
//! authority cannot be reached. A background reconciliation loop retries
//! parked documents with bounded attempts until each reaches a terminal
//! state.
//!
//! - [`orchestrator`]: the [`Emitter`] and per-document emission flow.
//! - [`reconciler`]: the bounded-retry reconciliation cycle and its
//!   background task.
//! - [`store`]: the repository trait owning document and contingency
//!   state, with in-memory and file-backed implementations.
//! - [`availability`]: cached heartbeat probing.
//! - [`contingency`]: contingency modes and records.
//! - [`config`]: the orchestrator's configuration surface.

pub mod availability;
pub mod config;
pub mod contingency;
pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod store;

// Re-export primary types.
pub use availability::AvailabilityCache;
pub use config::EmissionConfig;
pub use contingency::{ContingencyMode, ContingencyRecord, StorageLocation};
pub use error::EmissionError;
pub use orchestrator::{Emitter, EmissionOutcome};
pub use reconciler::{spawn_reconciler, ReconcilerHandle, ReconciliationReport};
pub use store::{DocumentRecord, EmissionStore, FileStore, InMemoryStore, StoreError};
