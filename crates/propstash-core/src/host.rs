//! Host collaborator contracts
//!
//! The host object model is out of scope; propstash only needs two
//! capabilities from it, expressed as traits: a per-object string-valued
//! property store with a byte-size ceiling per key, and a cooperative
//! "run this on the next turn" scheduling primitive.

use crate::error::StashResult;

/// A queued unit of work for the host's run loop.
pub type Turn = Box<dyn FnOnce() + Send>;

/// Per-object dynamic property store supplied by the host.
///
/// Implementations hold string values only; structure is the codec
/// pipeline's job. Errors are host-specific and surface as
/// `StashError::Host`.
pub trait PropertyStore: Send + Sync {
    /// Set a property. Passing None clears the key.
    fn set_property(&self, key: &str, value: Option<&str>) -> StashResult<()>;

    /// Read the raw stored string for a key.
    fn get_property(&self, key: &str) -> StashResult<Option<String>>;

    /// Every key currently set on this object.
    fn list_property_keys(&self) -> StashResult<Vec<String>>;

    /// Remove every property from this object.
    fn clear_all_properties(&self) -> StashResult<()>;

    /// Aggregate byte count across all stored properties, as the host
    /// measures it. Propstash never computes this locally.
    fn total_property_byte_count(&self) -> StashResult<u64>;
}

/// One-shot cooperative scheduling primitive.
///
/// `schedule` must invoke the turn once, asynchronously, on a later
/// iteration of the host's run loop. The incremental save loop performs
/// exactly one property write per scheduled turn.
pub trait TurnScheduler: Send + Sync {
    /// Queue a turn for later execution.
    fn schedule(&self, turn: Turn);
}
