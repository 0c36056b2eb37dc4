//! Pluggable compression for serialized property values
//!
//! A compressor is a named, invertible string transform applied after
//! notation encoding on the write path. `compress` and `decompress` must
//! form an inverse pair for every value ever passed through them; the
//! pipeline does not verify this.
//!
//! The default compressor is the identity transform "none". A "zstd"
//! compressor is also registered out of the box but must be selected
//! explicitly; it wraps its binary output in base64 so the result remains
//! a valid property string.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{StashError, StashResult};
use crate::registry::Codec;

/// String transform applied after notation encoding.
pub trait Compressor: Codec + Send + Sync {
    /// Compress a serialized value.
    fn compress(&self, data: &str) -> StashResult<String>;

    /// Invert `compress`.
    fn decompress(&self, data: &str) -> StashResult<String>;
}

/// Identity transform, the process default. Named "none".
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompressor;

impl Codec for NoopCompressor {
    fn name(&self) -> &str {
        "none"
    }
}

impl Compressor for NoopCompressor {
    fn compress(&self, data: &str) -> StashResult<String> {
        Ok(data.to_string())
    }

    fn decompress(&self, data: &str) -> StashResult<String> {
        Ok(data.to_string())
    }
}

/// zstd compression with base64-wrapped output. Named "zstd".
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Create a compressor at the default compression level.
    pub fn new() -> Self {
        Self { level: 3 }
    }

    /// Create a compressor at a specific zstd level.
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }

    fn error(&self, message: impl ToString) -> StashError {
        StashError::Compression {
            compressor: self.name().to_string(),
            message: message.to_string(),
        }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for ZstdCompressor {
    fn name(&self) -> &str {
        "zstd"
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &str) -> StashResult<String> {
        let compressed =
            zstd::encode_all(data.as_bytes(), self.level).map_err(|e| self.error(e))?;
        Ok(BASE64.encode(compressed))
    }

    fn decompress(&self, data: &str) -> StashResult<String> {
        let raw = BASE64.decode(data).map_err(|e| self.error(e))?;
        let bytes = zstd::decode_all(raw.as_slice()).map_err(|e| self.error(e))?;
        String::from_utf8(bytes).map_err(|e| self.error(e))
    }
}
