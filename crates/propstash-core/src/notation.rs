//! Pluggable structured-data <-> string codecs
//!
//! A notation handler turns a structured value into the string the host
//! property store can hold, and back. `stringify` and `parse` must form
//! an inverse pair for every value ever passed through them; the pipeline
//! does not verify this.

use serde_json::Value;

use crate::error::{StashError, StashResult};
use crate::registry::Codec;

/// Structured-data codec applied before compression on the write path
/// (and after decompression on the read path).
pub trait NotationHandler: Codec + Send + Sync {
    /// Encode a structured value as a string.
    fn stringify(&self, value: &Value) -> StashResult<String>;

    /// Decode a string produced by `stringify` back into a value.
    fn parse(&self, text: &str) -> StashResult<Value>;
}

/// JSON codec, registered and made default at registry construction.
/// Named "json".
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonNotation;

impl Codec for JsonNotation {
    fn name(&self) -> &str {
        "json"
    }
}

impl NotationHandler for JsonNotation {
    fn stringify(&self, value: &Value) -> StashResult<String> {
        serde_json::to_string(value).map_err(|e| StashError::Notation {
            handler: self.name().to_string(),
            message: e.to_string(),
        })
    }

    fn parse(&self, text: &str) -> StashResult<Value> {
        serde_json::from_str(text).map_err(|e| StashError::Notation {
            handler: self.name().to_string(),
            message: e.to_string(),
        })
    }
}
