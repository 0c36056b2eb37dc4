//! Store factory with a weak identity-keyed cache
//!
//! Exactly one DataStore should exist per host target. Instead of
//! augmenting host object prototypes, integrators go through an explicit
//! factory: `store_for(target)` constructs the DataStore lazily on first
//! access and hands back the cached one afterwards. The cache holds weak
//! references, and the stores themselves hold their target weakly, so a
//! cached store never keeps a destroyed target's storage alive.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::StashConfig;
use crate::datastore::DataStore;
use crate::error::{StashError, StashResult};
use crate::host::PropertyStore;
use crate::registry::Registries;

/// Lazily-memoizing DataStore factory, one store per distinct target.
///
/// Target identity is Arc pointer identity. Entries whose target has been
/// dropped are pruned on every access.
pub struct StoreCache {
    config: StashConfig,
    registries: Arc<Registries>,
    entries: Mutex<Vec<(Weak<dyn PropertyStore>, Arc<Mutex<DataStore>>)>>,
}

impl StoreCache {
    /// Create a cache that builds stores from `config` and `registries`.
    pub fn new(config: StashConfig, registries: Arc<Registries>) -> StashResult<Self> {
        config
            .validate()
            .map_err(|message| StashError::InvalidConfig { message })?;
        Ok(Self {
            config,
            registries,
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Create a cache with the default config and built-in registries.
    pub fn with_defaults() -> Self {
        Self {
            config: StashConfig::default(),
            registries: Arc::new(Registries::with_builtins()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// The registries stores built by this cache resolve codecs from.
    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    /// The DataStore for a target, constructed on first access.
    pub fn store_for(
        &self,
        target: &Arc<dyn PropertyStore>,
    ) -> StashResult<Arc<Mutex<DataStore>>> {
        let mut entries = self.entries.lock();
        entries.retain(|(weak, _)| weak.strong_count() > 0);

        for (weak, store) in entries.iter() {
            if let Some(existing) = weak.upgrade() {
                if Arc::ptr_eq(&existing, target) {
                    return Ok(Arc::clone(store));
                }
            }
        }

        let store = DataStore::new(Arc::clone(target), &self.config, &self.registries)?;
        let store = Arc::new(Mutex::new(store));
        entries.push((Arc::downgrade(target), Arc::clone(&store)));
        Ok(store)
    }

    /// Drop entries whose target no longer exists.
    pub fn prune(&self) {
        self.entries
            .lock()
            .retain(|(weak, _)| weak.strong_count() > 0);
    }

    /// Number of live cached stores.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|(weak, _)| weak.strong_count() > 0);
        entries.len()
    }

    /// Returns true if no live stores are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StoreCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCache")
            .field("config", &self.config)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestHost;
    use serde_json::json;

    #[test]
    fn test_same_target_same_store() {
        let cache = StoreCache::with_defaults();
        let host = TestHost::arc();
        let target: Arc<dyn PropertyStore> = host.clone();

        let first = cache.store_for(&target).unwrap();
        first.lock().data.insert("k", json!(1));

        let second = cache.store_for(&target).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().data.get("k"), Some(&json!(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_targets_distinct_stores() {
        let cache = StoreCache::with_defaults();
        let a: Arc<dyn PropertyStore> = TestHost::arc();
        let b: Arc<dyn PropertyStore> = TestHost::arc();

        let store_a = cache.store_for(&a).unwrap();
        let store_b = cache.store_for(&b).unwrap();
        assert!(!Arc::ptr_eq(&store_a, &store_b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_dropped_target_is_pruned() {
        let cache = StoreCache::with_defaults();
        let target: Arc<dyn PropertyStore> = TestHost::arc();
        let _store = cache.store_for(&target).unwrap();
        assert_eq!(cache.len(), 1);

        drop(target);
        cache.prune();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_store_does_not_pin_target() {
        let cache = StoreCache::with_defaults();
        let host = TestHost::arc();
        let target: Arc<dyn PropertyStore> = host.clone();
        let store = cache.store_for(&target).unwrap();
        store.lock().data.insert("k", json!(1));

        // Holding the store must not keep the target alive
        drop(target);
        assert_eq!(Arc::strong_count(&host), 1);
        drop(host);

        assert!(cache.is_empty());
        assert!(store.lock().total_size().is_err());
    }

    #[test]
    fn test_debug_format() {
        let cache = StoreCache::with_defaults();
        let text = format!("{:?}", cache);
        assert!(text.contains("StoreCache"));
        assert!(text.contains("entries: 0"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StashConfig {
            safe_length: 0,
            ..StashConfig::default()
        };
        let err =
            StoreCache::new(config, Arc::new(Registries::with_builtins())).unwrap_err();
        assert!(matches!(err, StashError::InvalidConfig { .. }));
    }
}
