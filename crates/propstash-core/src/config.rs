//! Configuration for propstash data stores
//!
//! One StashConfig describes how a DataStore talks to its host target:
//! which codecs to resolve and how large a single serialized property
//! value may grow before a write is refused.

use serde::{Deserialize, Serialize};

/// Default maximum length of one serialized+compressed property value.
pub const DEFAULT_SAFE_LENGTH: usize = 500;

/// DataStore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashConfig {
    /// Maximum allowed length of one serialized+compressed property value.
    /// Writes exceeding this are skipped and logged; the in-memory value
    /// stays put and is retried on the next flush.
    pub safe_length: usize,
    /// Compressor to resolve at store construction. Treated as a regular
    /// expression tested against registered compressor names.
    pub compressor: String,
    /// Notation handler to resolve at store construction. Exact name match.
    pub notation: String,
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            safe_length: DEFAULT_SAFE_LENGTH,
            compressor: "none".to_string(),
            notation: "json".to_string(),
        }
    }
}

impl StashConfig {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.safe_length == 0 {
            return Err("safe_length must be > 0".into());
        }
        if self.compressor.is_empty() {
            return Err("compressor name must not be empty".into());
        }
        if self.notation.is_empty() {
            return Err("notation handler name must not be empty".into());
        }
        Ok(())
    }
}
