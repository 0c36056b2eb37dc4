//! In-memory host adapter for propstash.
//!
//! Implements the `PropertyStore` and `TurnScheduler` contracts without a
//! real host: `MemPropertyStore` keeps properties in a hash table and
//! `ManualTurnScheduler` queues turns for explicit, one-at-a-time
//! execution. Together they make the cooperative save protocol fully
//! deterministic, which is what integration tests and embedders need.

mod property;
mod turns;

pub use property::MemPropertyStore;
pub use turns::ManualTurnScheduler;
