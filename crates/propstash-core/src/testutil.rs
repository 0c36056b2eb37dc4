//! Shared test fixtures: an in-memory property store with write logging
//! and fault injection, and a manually drained turn queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::{StashError, StashResult};
use crate::host::{PropertyStore, Turn, TurnScheduler};

/// In-memory property store for unit tests.
#[derive(Default)]
pub(crate) struct TestHost {
    props: Mutex<IndexMap<String, String>>,
    write_log: Mutex<Vec<(String, Option<String>)>>,
    fail_next_write: AtomicBool,
}

impl TestHost {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Raw stored string for a key.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.props.lock().get(key).cloned()
    }

    /// Total number of writes (sets and clears) issued so far.
    pub fn writes(&self) -> usize {
        self.write_log.lock().len()
    }

    /// Keys in write order, including clearing writes.
    pub fn written_keys(&self) -> Vec<String> {
        self.write_log.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Make the next set_property call fail.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::Release);
    }

    /// Current properties as (key, value) pairs.
    pub fn contents(&self) -> Vec<(String, String)> {
        self.props
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Seed a raw property without logging a write.
    pub fn seed(&self, key: &str, value: &str) {
        self.props.lock().insert(key.to_string(), value.to_string());
    }
}

impl PropertyStore for TestHost {
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
                props.shift_remove(key);
            }
        }
        Ok(())
    }

    fn get_property(&self, key: &str) -> StashResult<Option<String>> {
        Ok(self.props.lock().get(key).cloned())
    }

    fn list_property_keys(&self) -> StashResult<Vec<String>> {
        Ok(self.props.lock().keys().cloned().collect())
    }

    fn clear_all_properties(&self) -> StashResult<()> {
        self.props.lock().clear();
        Ok(())
    }

    fn total_property_byte_count(&self) -> StashResult<u64> {
        Ok(self.props.lock().values().map(|v| v.len() as u64).sum())
    }
}

/// FIFO turn queue drained explicitly by tests.
#[derive(Default)]
pub(crate) struct QueueScheduler {
    queue: Mutex<VecDeque<Turn>>,
}

impl QueueScheduler {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Pop and run one queued turn; false if the queue was empty.
    /// The queue lock is released before the turn runs so it can reschedule.
    pub fn run_next_turn(&self) -> bool {
        let turn = self.queue.lock().pop_front();
        match turn {
            Some(turn) => {
                turn();
                true
            }
            None => false,
        }
    }

    /// Run turns until the queue drains. Returns the number executed.
    pub fn run_all(&self) -> usize {
        let mut executed = 0;
        while self.run_next_turn() {
            executed += 1;
        }
        executed
    }
}

impl TurnScheduler for QueueScheduler {
    fn schedule(&self, turn: Turn) {
        self.queue.lock().push_back(turn);
    }
}
