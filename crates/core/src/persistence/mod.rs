//! Persistence boundary
//!
//! - [`wire`]: record schema and the modern codec
//! - [`legacy`]: reader for records wrapping native viewer storage
//! - [`queue`]: frame-coalesced diffing of model changes into batches
//! - [`adapter`]: backend trait and the adapter driving it

pub mod adapter;
pub mod legacy;
pub mod queue;
pub mod wire;

pub use adapter::{AnnotationBackend, LoadOutcome, MemoryBackend, PersistenceAdapter, RejectedRecord};
pub use queue::{BatchId, FlushReport, PendingSave, SaveBatch, SaveQueue};
pub use wire::{decode, encode, type_name, Decoded, GeometryAnomaly, WireRecord};
