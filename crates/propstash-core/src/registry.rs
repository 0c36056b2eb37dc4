//! Named codec registries with resolvable defaults
//!
//! Two registries exist per `Registries` instance: one for compressors,
//! one for notation handlers. Registration is first-wins: a duplicate
//! name or identical instance is refused with a warning, never an error.
//! Registries are explicit objects injected into each DataStore rather
//! than process-wide globals, so tests can build isolated worlds.

use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use tracing::warn;

use crate::compress::{Compressor, NoopCompressor, ZstdCompressor};
use crate::notation::{JsonNotation, NotationHandler};

/// Anything carrying an immutable registry name.
pub trait Codec {
    /// Name the entry registers and resolves under. Unique per registry.
    fn name(&self) -> &str;
}

/// How `resolve` interprets a query string.
///
/// Notation handlers resolve by exact name; compressors resolve by
/// regular-expression test against registered names. The asymmetry is
/// intentional and preserved: a compressor config of `"zs.*"` resolves
/// the "zstd" entry, while notation lookup never pattern-matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Query must equal the entry name exactly.
    Exact,
    /// Query is a regular expression tested against entry names.
    /// A query that fails to compile as a regex falls back to exact match.
    Pattern,
}

/// Ordered registry of named codec entries with a resolvable default.
pub struct CodecRegistry<T: Codec + ?Sized> {
    entries: Vec<Arc<T>>,
    default: Option<Arc<T>>,
    mode: MatchMode,
}

impl<T: Codec + ?Sized> CodecRegistry<T> {
    /// Create an empty registry using the given resolution mode.
    pub fn new(mode: MatchMode) -> Self {
        Self {
            entries: Vec::new(),
            default: None,
            mode,
        }
    }

    /// Register an entry.
    ///
    /// Returns false (and warns) if the same instance or an entry with the
    /// same name is already registered; the first registration wins.
    pub fn register(&mut self, entry: Arc<T>) -> bool {
        let duplicate = self
            .entries
            .iter()
            .any(|e| Arc::ptr_eq(e, &entry) || e.name() == entry.name());
        if duplicate {
            warn!(name = entry.name(), "codec already registered, ignoring");
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Resolve a query to the first matching registered entry.
    ///
    /// Returns None when nothing matches; absence is not an error here,
    /// callers decide whether an unresolved codec is fatal.
    pub fn resolve(&self, query: &str) -> Option<Arc<T>> {
        match self.mode {
            MatchMode::Exact => self.resolve_exact(query),
            MatchMode::Pattern => match Regex::new(query) {
                Ok(re) => self
                    .entries
                    .iter()
                    .find(|e| re.is_match(e.name()))
                    .cloned(),
                Err(_) => self.resolve_exact(query),
            },
        }
    }

    fn resolve_exact(&self, query: &str) -> Option<Arc<T>> {
        self.entries.iter().find(|e| e.name() == query).cloned()
    }

    /// The current default entry, if one has been set.
    pub fn default_entry(&self) -> Option<Arc<T>> {
        self.default.clone()
    }

    /// Set the default entry, registering it first if it is not yet known.
    pub fn set_default(&mut self, entry: Arc<T>) {
        let known = self
            .entries
            .iter()
            .any(|e| Arc::ptr_eq(e, &entry) || e.name() == entry.name());
        if !known {
            self.entries.push(Arc::clone(&entry));
        }
        self.default = Some(entry);
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compressor and notation-handler registries with built-ins installed.
///
/// Construction registers the identity compressor "none" (default), the
/// "zstd" compressor (not default), and the "json" notation handler
/// (default).
pub struct Registries {
    compressors: RwLock<CodecRegistry<dyn Compressor>>,
    notations: RwLock<CodecRegistry<dyn NotationHandler>>,
}

impl Registries {
    /// Create registries populated with the built-in codecs.
    pub fn with_builtins() -> Self {
        let mut compressors = CodecRegistry::new(MatchMode::Pattern);
        compressors.set_default(Arc::new(NoopCompressor) as Arc<dyn Compressor>);
        compressors.register(Arc::new(ZstdCompressor::new()) as Arc<dyn Compressor>);

        let mut notations = CodecRegistry::new(MatchMode::Exact);
        notations.set_default(Arc::new(JsonNotation) as Arc<dyn NotationHandler>);

        Self {
            compressors: RwLock::new(compressors),
            notations: RwLock::new(notations),
        }
    }

    /// Register a compressor. First registration of a name wins.
    pub fn register_compressor(&self, compressor: Arc<dyn Compressor>) -> bool {
        self.compressors.write().register(compressor)
    }

    /// Register a notation handler. First registration of a name wins.
    pub fn register_notation(&self, notation: Arc<dyn NotationHandler>) -> bool {
        self.notations.write().register(notation)
    }

    /// Resolve a compressor by regex pattern over registered names.
    pub fn resolve_compressor(&self, query: &str) -> Option<Arc<dyn Compressor>> {
        self.compressors.read().resolve(query)
    }

    /// Resolve a notation handler by exact name.
    pub fn resolve_notation(&self, query: &str) -> Option<Arc<dyn NotationHandler>> {
        self.notations.read().resolve(query)
    }

    /// The default compressor.
    pub fn default_compressor(&self) -> Option<Arc<dyn Compressor>> {
        self.compressors.read().default_entry()
    }

    /// The default notation handler.
    pub fn default_notation(&self) -> Option<Arc<dyn NotationHandler>> {
        self.notations.read().default_entry()
    }

    /// Replace the default compressor, registering it if needed.
    pub fn set_default_compressor(&self, compressor: Arc<dyn Compressor>) {
        self.compressors.write().set_default(compressor)
    }

    /// Replace the default notation handler, registering it if needed.
    pub fn set_default_notation(&self, notation: Arc<dyn NotationHandler>) {
        self.notations.write().set_default(notation)
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::with_builtins()
    }
}
