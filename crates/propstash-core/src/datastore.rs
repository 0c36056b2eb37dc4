//! DataStore — the orchestrator tying one CloneableStore to one host target
//!
//! Callers mutate `data` directly, then flush it with `save()` (blocking,
//! all writes within the current turn) or `save_async()` (one write per
//! turn via the PersistenceScheduler). `load()` populates `data` from the
//! host store on the first call only.
//!
//! Partial-failure policy: load and both save paths catch codec and write
//! errors at the single-entry granularity, log them, and keep going. One
//! corrupt or oversized entry never blocks persistence of the rest, and
//! the unsaved value stays in memory so the next flush naturally retries.

use std::fmt;
use std::sync::mpsc::channel;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::compress::Compressor;
use crate::config::StashConfig;
use crate::error::{StashError, StashResult};
use crate::host::{PropertyStore, TurnScheduler};
use crate::notation::NotationHandler;
use crate::registry::Registries;
use crate::scheduler::{drive, persist_entry, PersistenceScheduler, SaveFlags, SaveTicket};
use crate::store::CloneableStore;

/// Persistence cache for one host target.
///
/// Holds the target weakly: the host owns the target's lifetime, and a
/// store must not keep a destroyed target alive (a cached store would
/// otherwise pin it forever). Operations after the target is gone fail
/// with a host error.
pub struct DataStore {
    target: Weak<dyn PropertyStore>,
    notation: Arc<dyn NotationHandler>,
    compressor: Arc<dyn Compressor>,
    safe_length: usize,
    /// The in-memory working surface. Mutate freely, then flush.
    pub data: CloneableStore,
    loaded: bool,
    flags: Arc<SaveFlags>,
}

impl DataStore {
    /// Create a store for one host target, resolving codecs from
    /// `registries` per `config`.
    ///
    /// Fails fast on invalid configuration or an unresolvable codec name.
    pub fn new(
        target: Arc<dyn PropertyStore>,
        config: &StashConfig,
        registries: &Registries,
    ) -> StashResult<Self> {
        config
            .validate()
            .map_err(|message| StashError::InvalidConfig { message })?;

        let compressor = registries.resolve_compressor(&config.compressor).ok_or_else(|| {
            StashError::CodecNotFound {
                kind: "compressor",
                query: config.compressor.clone(),
            }
        })?;
        let notation = registries.resolve_notation(&config.notation).ok_or_else(|| {
            StashError::CodecNotFound {
                kind: "notation handler",
                query: config.notation.clone(),
            }
        })?;

        Ok(Self {
            target: Arc::downgrade(&target),
            notation,
            compressor,
            safe_length: config.safe_length,
            data: CloneableStore::new(),
            loaded: false,
            flags: Arc::new(SaveFlags::new()),
        })
    }

    /// Create a store with the default config against fresh built-in
    /// registries (identity compressor, JSON notation).
    pub fn with_defaults(target: Arc<dyn PropertyStore>) -> StashResult<Self> {
        Self::new(target, &StashConfig::default(), &Registries::with_builtins())
    }

    fn target(&self) -> StashResult<Arc<dyn PropertyStore>> {
        self.target.upgrade().ok_or_else(|| StashError::Host {
            key: None,
            message: "host target no longer exists".to_string(),
        })
    }

    /// Whether `load()` has run.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Max allowed length of one serialized+compressed property value.
    pub fn safe_length(&self) -> usize {
        self.safe_length
    }

    /// Name of the active compressor.
    pub fn compressor_name(&self) -> &str {
        self.compressor.name()
    }

    /// Name of the active notation handler.
    pub fn notation_name(&self) -> &str {
        self.notation.name()
    }

    /// True while a synchronous save is running.
    pub fn synchronous_save_in_progress(&self) -> bool {
        self.flags.synchronous_save_in_progress()
    }

    /// True while an incremental save is in flight.
    pub fn asynchronous_save_in_progress(&self) -> bool {
        self.flags.asynchronous_save_in_progress()
    }

    /// Override the safe length for this store. Must be positive.
    pub fn set_safe_length(&mut self, safe_length: usize) -> StashResult<()> {
        if safe_length == 0 {
            return Err(StashError::InvalidConfig {
                message: "safe_length must be > 0".into(),
            });
        }
        self.safe_length = safe_length;
        Ok(())
    }

    /// Swap the compressor, resolving `query` as a pattern over
    /// registered names.
    pub fn set_compressor(&mut self, registries: &Registries, query: &str) -> StashResult<()> {
        self.compressor =
            registries
                .resolve_compressor(query)
                .ok_or_else(|| StashError::CodecNotFound {
                    kind: "compressor",
                    query: query.to_string(),
                })?;
        Ok(())
    }

    /// Swap the notation handler, resolving `query` by exact name.
    pub fn set_notation(&mut self, registries: &Registries, query: &str) -> StashResult<()> {
        self.notation =
            registries
                .resolve_notation(query)
                .ok_or_else(|| StashError::CodecNotFound {
                    kind: "notation handler",
                    query: query.to_string(),
                })?;
        Ok(())
    }

    /// Populate the in-memory store from the host property store.
    ///
    /// First call only; every later call is a no-op. Each stored property
    /// is decompressed and parsed; per-key failures are logged and
    /// skipped. `loaded` flips true after the pass even if some keys
    /// failed.
    pub fn load(&mut self) -> StashResult<()> {
        if self.loaded {
            return Ok(());
        }

        let target = self.target()?;
        let keys = target.list_property_keys()?;
        for key in keys {
            match self.read_key(target.as_ref(), &key) {
                Ok(Some(value)) => {
                    self.data.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, "skipping property during load: {}", e),
            }
        }

        self.loaded = true;
        debug!(entries = self.data.len(), "store loaded from host");
        Ok(())
    }

    fn read_key(&self, target: &dyn PropertyStore, key: &str) -> StashResult<Option<Value>> {
        let raw = match target.get_property(key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let text = self.compressor.decompress(&raw)?;
        Ok(Some(self.notation.parse(&text)?))
    }

    /// Synchronous full flush.
    ///
    /// Writes every entry in insertion order within the current turn.
    /// No-op if a synchronous save is already in progress, or if the host
    /// target no longer exists (logged). A running incremental save
    /// observes the save flags and yields at its next turn boundary, even
    /// when this save finishes before that turn runs. Per-entry failures
    /// are logged and skipped.
    pub fn save(&self) {
        if self.flags.synchronous_save_in_progress() {
            return;
        }
        let target = match self.target.upgrade() {
            Some(target) => target,
            None => {
                warn!("save skipped: host target no longer exists");
                return;
            }
        };
        self.flags.begin_synchronous();

        for (key, value) in self.data.iter() {
            if let Err(e) = persist_entry(
                target.as_ref(),
                self.notation.as_ref(),
                self.compressor.as_ref(),
                self.safe_length,
                key,
                value,
            ) {
                error!(key = %key, "skipping entry during save: {}", e);
            }
        }

        self.flags.end_synchronous();
    }

    /// Start an incremental save over a snapshot of the current entries.
    ///
    /// Returns immediately with a ticket resolving to the loop outcome.
    /// Entries inserted after this call are not visited by this loop.
    /// Errors with `SaveBusy` if an incremental save is already in flight.
    pub fn save_async(&self, turns: &Arc<dyn TurnScheduler>) -> StashResult<SaveTicket> {
        let target = self.target()?;
        if !self.flags.try_claim_asynchronous() {
            return Err(StashError::SaveBusy);
        }

        let snapshot = self.data.snapshot();
        debug!(entries = snapshot.len(), "incremental save started");

        let scheduler = PersistenceScheduler::new(
            snapshot,
            target,
            Arc::clone(&self.notation),
            Arc::clone(&self.compressor),
            self.safe_length,
            Arc::clone(&self.flags),
        );

        let (tx, rx) = channel();
        drive(scheduler, Arc::clone(turns), tx);
        Ok(SaveTicket::new(rx))
    }

    /// Delete a key from memory and clear it on the host.
    ///
    /// Absent keys return false without any host call. Present keys get
    /// exactly one clearing write, then the in-memory entry is removed
    /// (remaining entry order preserved). On a failed clearing write the
    /// value stays in memory, so memory and host never disagree about a
    /// key the caller still holds.
    pub fn remove(&mut self, key: &str) -> StashResult<bool> {
        if !self.data.contains_key(key) {
            return Ok(false);
        }
        self.target()?.set_property(key, None)?;
        self.data.remove(key);
        Ok(true)
    }

    /// Drop every in-memory entry and clear all host properties,
    /// unconditionally.
    pub fn clear(&mut self) -> StashResult<()> {
        let target = self.target()?;
        self.data.clear();
        target.clear_all_properties()
    }

    /// Length of the raw stored (serialized+compressed) string for a key,
    /// 0 when the host has no such property. Measures host-stored length,
    /// not in-memory value size.
    pub fn length(&self, key: &str) -> StashResult<usize> {
        Ok(self.target()?.get_property(key)?.map_or(0, |raw| raw.len()))
    }

    /// Host-reported aggregate byte count across all properties of the
    /// target.
    pub fn total_size(&self) -> StashResult<u64> {
        self.target()?.total_property_byte_count()
    }
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("entries", &self.data.len())
            .field("loaded", &self.loaded)
            .field("safe_length", &self.safe_length)
            .field("compressor", &self.compressor.name())
            .field("notation", &self.notation.name())
            .finish()
    }
}
