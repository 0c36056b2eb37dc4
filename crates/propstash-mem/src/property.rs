//! In-memory `PropertyStore` implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use propstash_core::{PropertyStore, StashError, StashResult};

/// Hash-table-backed dynamic property store.
///
/// Keeps a write log (every set and clear, in order) and supports
/// injecting a one-shot write failure, so tests can assert exactly which
/// host calls a flush issued and that per-entry failures are tolerated.
#[derive(Default)]
pub struct MemPropertyStore {
    props: Mutex<HashMap<String, String>>,
    write_log: Mutex<Vec<(String, Option<String>)>>,
    fail_next_write: AtomicBool,
}

impl MemPropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind an Arc, ready to pass as a target.
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of properties currently set.
    pub fn property_count(&self) -> usize {
        self.props.lock().len()
    }

    /// Raw stored string for a key.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.props.lock().get(key).cloned()
    }

    /// Seed a raw property directly, bypassing the write log.
    pub fn seed(&self, key: &str, value: &str) {
        self.props.lock().insert(key.to_string(), value.to_string());
    }

    /// Total number of writes (sets and clears) issued so far.
    pub fn write_count(&self) -> usize {
        self.write_log.lock().len()
    }

    /// Keys in write order, including clearing writes.
    pub fn written_keys(&self) -> Vec<String> {
        self.write_log.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Sorted snapshot of the current properties.
    pub fn contents(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .props
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Make the next `set_property` call fail with a host error.
    pub fn set_fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::Release);
    }
}

impl PropertyStore for MemPropertyStore {
    fn set_property(&self, key: &str, value: Option<&str>) -> StashResult<()> {
        if self.fail_next_write.swap(false, Ordering::AcqRel) {
            return Err(StashError::Host {
                key: Some(key.to_string()),
                message: "injected write failure".to_string(),
            });
        }
        self.write_log
            .lock()
            .push((key.to_string(), value.map(str::to_string)));
        let mut props = self.props.lock();
        match value {
            Some(v) => {
                props.insert(key.to_string(), v.to_string());
            }
            None => {
                props.remove(key);
            }
        }
        Ok(())
    }

    fn get_property(&self, key: &str) -> StashResult<Option<String>> {
        Ok(self.props.lock().get(key).cloned())
    }

    fn list_property_keys(&self) -> StashResult<Vec<String>> {
        let mut keys: Vec<String> = self.props.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn clear_all_properties(&self) -> StashResult<()> {
        self.props.lock().clear();
        Ok(())
    }

    fn total_property_byte_count(&self) -> StashResult<u64> {
        // Counts stored value bytes; keys are the host's bookkeeping
        Ok(self.props.lock().values().map(|v| v.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let store = MemPropertyStore::new();
        store.set_property("k", Some("v")).unwrap();
        assert_eq!(store.get_property("k").unwrap(), Some("v".to_string()));

        store.set_property("k", None).unwrap();
        assert_eq!(store.get_property("k").unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_list_keys_sorted() {
        let store = MemPropertyStore::new();
        store.set_property("b", Some("2")).unwrap();
        store.set_property("a", Some("1")).unwrap();
        assert_eq!(store.list_property_keys().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_total_byte_count() {
        let store = MemPropertyStore::new();
        store.set_property("a", Some("123")).unwrap();
        store.set_property("b", Some("45")).unwrap();
        assert_eq!(store.total_property_byte_count().unwrap(), 5);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let store = MemPropertyStore::new();
        store.set_fail_next_write();
        assert!(store.set_property("k", Some("v")).is_err());
        assert!(store.set_property("k", Some("v")).is_ok());
        assert_eq!(store.write_count(), 1); // failed write never logged
    }

    #[test]
    fn test_clear_all() {
        let store = MemPropertyStore::new();
        store.set_property("a", Some("1")).unwrap();
        store.set_property("b", Some("2")).unwrap();
        store.clear_all_properties().unwrap();
        assert_eq!(store.property_count(), 0);
    }
}
