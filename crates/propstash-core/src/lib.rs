//! Propstash Core — persistence caching over host dynamic properties
//!
//! A small layer between application logic and a host-provided per-object
//! key/value property store, where each key holds one size-capped string
//! and every host call is comparatively expensive.
//!
//! # Architecture
//!
//! - **Working surface**: callers mutate an in-memory, insertion-ordered
//!   `CloneableStore` of structured values directly
//! - **Codec pipeline**: notation handler (value <-> string) composed
//!   with a compressor (string <-> string), both pluggable via named
//!   registries with resolvable defaults
//! - **Flush paths**: `save()` writes everything within the current turn;
//!   `save_async()` runs the `PersistenceScheduler`, which writes one
//!   entry per host turn and yields cooperatively when a synchronous
//!   save preempts it
//!
//! # Host Independence
//!
//! The host object model is out of scope. Propstash only requires the
//! `PropertyStore` and `TurnScheduler` traits; any host that can store
//! strings per object and run a callback on a later turn can back it.
//! An in-memory reference host lives in the propstash-mem crate.

pub mod accessor;
pub mod compress;
pub mod config;
pub mod datastore;
pub mod error;
pub mod host;
pub mod notation;
pub mod registry;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod testutil;

// Re-export key types for convenience
pub use accessor::StoreCache;
pub use compress::{Compressor, NoopCompressor, ZstdCompressor};
pub use config::{StashConfig, DEFAULT_SAFE_LENGTH};
pub use datastore::DataStore;
pub use error::{StashError, StashResult};
pub use host::{PropertyStore, Turn, TurnScheduler};
pub use notation::{JsonNotation, NotationHandler};
pub use registry::{Codec, CodecRegistry, MatchMode, Registries};
pub use scheduler::{PersistenceScheduler, SaveFlags, SaveOutcome, SaveTicket};
pub use store::CloneableStore;
