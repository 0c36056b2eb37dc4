//! Error types for propstash operations
//!
//! All propstash errors are represented by the StashError enum.
//! Configuration and codec-resolution misuse surfaces immediately to the
//! caller; data-level problems during bulk load/save are caught at the
//! single-entry granularity by the callers and logged, never aborting the
//! whole operation.

use std::error::Error;
use std::fmt;

/// Propstash error types with detailed context
#[derive(Debug, Clone)]
pub enum StashError {
    /// No registered codec matched the requested name or pattern
    CodecNotFound {
        /// Which registry was searched ("compressor" or "notation handler")
        kind: &'static str,
        /// The name or pattern that failed to resolve
        query: String,
    },

    /// Configuration rejected by validation
    InvalidConfig {
        /// Description of the rejected parameter
        message: String,
    },

    /// Notation handler failed to stringify or parse a value
    Notation {
        /// Name of the handler that failed
        handler: String,
        /// Underlying codec error
        message: String,
    },

    /// Compressor failed to compress or decompress a payload
    Compression {
        /// Name of the compressor that failed
        compressor: String,
        /// Underlying codec error
        message: String,
    },

    /// Serialized+compressed value exceeds the safe length for one property
    Oversized {
        /// Key whose value was refused
        key: String,
        /// Length of the serialized+compressed value
        length: usize,
        /// Configured safe length
        limit: usize,
    },

    /// The host property store rejected an operation
    Host {
        /// Key involved, when the operation targeted a single property
        key: Option<String>,
        /// Host-provided description
        message: String,
    },

    /// An incremental save is already in flight on this store
    SaveBusy,
}

impl fmt::Display for StashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StashError::CodecNotFound { kind, query } => {
                write!(f, "no registered {} matches {:?}", kind, query)
            }

            StashError::InvalidConfig { message } => {
                write!(f, "invalid configuration: {}", message)
            }

            StashError::Notation { handler, message } => {
                write!(f, "notation handler {:?} failed: {}", handler, message)
            }

            StashError::Compression { compressor, message } => {
                write!(f, "compressor {:?} failed: {}", compressor, message)
            }

            StashError::Oversized { key, length, limit } => {
                write!(
                    f,
                    "value for key {:?} too large: {} bytes exceeds safe length of {}",
                    key, length, limit
                )
            }

            StashError::Host { key, message } => {
                if let Some(key) = key {
                    write!(f, "host property store error for key {:?}: {}", key, message)
                } else {
                    write!(f, "host property store error: {}", message)
                }
            }

            StashError::SaveBusy => {
                write!(f, "an incremental save is already in flight")
            }
        }
    }
}

impl Error for StashError {}

/// Result type alias for propstash operations
pub type StashResult<T> = Result<T, StashError>;
