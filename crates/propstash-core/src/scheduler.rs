//! Incremental save scheduler — cooperative flush of store entries
//!
//! The host's run loop forbids long synchronous blocking work, so a full
//! flush of a large store cannot happen inside one turn. The scheduler
//! walks a snapshot of the store's entries and performs exactly one
//! serialize+compress+write per turn:
//!
//! 1. At the top of every turn it checks the shared save flags; if a
//!    synchronous save has begun since the loop started — even one that
//!    already finished between two turns — it yields without writing
//!    (the synchronous path rewrites everything anyway). Preemption is
//!    latched by a monotonic sync-save counter, not just the in-progress
//!    flag: in the cooperative model a whole synchronous save usually
//!    runs between two loop turns, so the flag alone would never be
//!    observed set.
//! 2. Otherwise it advances the snapshot iterator by one entry and writes it.
//! 3. Per-entry codec or write failures are logged and skipped — a bad
//!    entry never stops the loop, so there is no reachable failed state.
//!
//! Preemption is cooperative: it takes effect at the next turn boundary,
//! never mid-write. The flags are atomics so the same protocol holds on a
//! host that runs turns from more than one thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::compress::Compressor;
use crate::error::{StashError, StashResult};
use crate::host::{PropertyStore, TurnScheduler};
use crate::notation::NotationHandler;

/// Why a save loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Every snapshotted entry was visited.
    Completed,
    /// A synchronous save started; the loop yielded at a turn boundary.
    Preempted,
}

impl SaveOutcome {
    /// Numeric reason code: 0 = completed, 2 = preempted.
    pub fn code(&self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Preempted => 2,
        }
    }
}

/// Busy flags shared between the synchronous and asynchronous save paths
/// of one DataStore.
#[derive(Debug, Default)]
pub struct SaveFlags {
    synchronous: AtomicBool,
    asynchronous: AtomicBool,
    /// Synchronous saves ever started. Lets an incremental loop observe
    /// a sync save that began and finished entirely between its turns.
    sync_saves: AtomicU64,
}

impl SaveFlags {
    /// Create a flag pair with neither save path active.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a synchronous save is running.
    pub fn synchronous_save_in_progress(&self) -> bool {
        self.synchronous.load(Ordering::Acquire)
    }

    /// True while an incremental save loop is in flight.
    pub fn asynchronous_save_in_progress(&self) -> bool {
        self.asynchronous.load(Ordering::Acquire)
    }

    /// Number of synchronous saves that have ever started.
    pub fn synchronous_save_count(&self) -> u64 {
        self.sync_saves.load(Ordering::Acquire)
    }

    /// Mark a synchronous save as started: bump the counter, set the flag.
    pub(crate) fn begin_synchronous(&self) {
        self.sync_saves.fetch_add(1, Ordering::AcqRel);
        self.synchronous.store(true, Ordering::Release);
    }

    /// Mark the running synchronous save as finished.
    pub(crate) fn end_synchronous(&self) {
        self.synchronous.store(false, Ordering::Release);
    }

    pub(crate) fn set_asynchronous(&self, active: bool) {
        self.asynchronous.store(active, Ordering::Release);
    }

    /// Claim the asynchronous flag; false if a loop is already in flight.
    pub(crate) fn try_claim_asynchronous(&self) -> bool {
        self.asynchronous
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Serialize, compress, length-check, and write one entry.
///
/// Shared by the synchronous save path and the incremental loop. A value
/// whose serialized+compressed form exceeds `safe_length` is refused
/// before any host call; the property for that key is simply not set.
pub(crate) fn persist_entry(
    target: &dyn PropertyStore,
    notation: &dyn NotationHandler,
    compressor: &dyn Compressor,
    safe_length: usize,
    key: &str,
    value: &Value,
) -> StashResult<()> {
    let text = notation.stringify(value)?;
    let packed = compressor.compress(&text)?;
    if packed.len() > safe_length {
        return Err(StashError::Oversized {
            key: key.to_string(),
            length: packed.len(),
            limit: safe_length,
        });
    }
    target.set_property(key, Some(&packed))
}

/// Resumable state machine for the incremental save loop.
///
/// Holds the entry snapshot taken when the loop started. `step()` is
/// called once per host turn and processes at most one entry. The loop
/// clears the shared asynchronous flag when it finishes, however it ends.
pub struct PersistenceScheduler {
    entries: std::vec::IntoIter<(String, Value)>,
    target: Arc<dyn PropertyStore>,
    notation: Arc<dyn NotationHandler>,
    compressor: Arc<dyn Compressor>,
    safe_length: usize,
    flags: Arc<SaveFlags>,
    /// Sync-save counter at loop start; a later value means preemption.
    start_sync_saves: u64,
    outcome: Option<SaveOutcome>,
}

impl PersistenceScheduler {
    pub(crate) fn new(
        entries: Vec<(String, Value)>,
        target: Arc<dyn PropertyStore>,
        notation: Arc<dyn NotationHandler>,
        compressor: Arc<dyn Compressor>,
        safe_length: usize,
        flags: Arc<SaveFlags>,
    ) -> Self {
        let start_sync_saves = flags.synchronous_save_count();
        Self {
            entries: entries.into_iter(),
            target,
            notation,
            compressor,
            safe_length,
            flags,
            start_sync_saves,
            outcome: None,
        }
    }

    /// Advance the loop by one turn.
    ///
    /// Returns the final outcome once the loop is over, None while more
    /// turns are needed. Calling `step` after the loop finished returns
    /// the same outcome and does nothing else.
    pub fn step(&mut self) -> Option<SaveOutcome> {
        if let Some(outcome) = self.outcome {
            return Some(outcome);
        }

        // Preemption check happens before any work this turn. The counter
        // comparison catches a sync save that ran to completion between
        // turns, which the in-progress flag alone would miss.
        if self.flags.synchronous_save_in_progress()
            || self.flags.synchronous_save_count() != self.start_sync_saves
        {
            debug!("incremental save preempted by synchronous save");
            return Some(self.finish(SaveOutcome::Preempted));
        }

        match self.entries.next() {
            None => Some(self.finish(SaveOutcome::Completed)),
            Some((key, value)) => {
                if let Err(e) = persist_entry(
                    self.target.as_ref(),
                    self.notation.as_ref(),
                    self.compressor.as_ref(),
                    self.safe_length,
                    &key,
                    &value,
                ) {
                    warn!(key = %key, "skipping entry during incremental save: {}", e);
                }
                None
            }
        }
    }

    fn finish(&mut self, outcome: SaveOutcome) -> SaveOutcome {
        self.outcome = Some(outcome);
        self.flags.set_asynchronous(false);
        outcome
    }

    /// True once the loop has completed or been preempted.
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// True if the loop ended by yielding to a synchronous save.
    pub fn is_preempted(&self) -> bool {
        self.outcome == Some(SaveOutcome::Preempted)
    }

    /// Entries not yet visited.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

/// Awaitable handle for an in-flight incremental save.
#[derive(Debug)]
pub struct SaveTicket {
    rx: Receiver<SaveOutcome>,
}

impl SaveTicket {
    pub(crate) fn new(rx: Receiver<SaveOutcome>) -> Self {
        Self { rx }
    }

    /// Block until the loop completes or is preempted.
    ///
    /// On a single-threaded host, drain the turn scheduler before waiting
    /// or this will never return. Errors if the host dropped the queued
    /// turns without running them.
    pub fn wait(self) -> StashResult<SaveOutcome> {
        self.rx.recv().map_err(|_| StashError::Host {
            key: None,
            message: "save loop dropped before completing".to_string(),
        })
    }

    /// Non-blocking check. None while the loop is still running.
    ///
    /// The outcome is delivered once: after `try_outcome` returns Some,
    /// a later `wait` on the same ticket errors.
    pub fn try_outcome(&self) -> Option<SaveOutcome> {
        self.rx.try_recv().ok()
    }
}

/// Run a scheduler to completion, one `step()` per host turn.
///
/// Each turn either finishes the loop and resolves the ticket, or
/// reschedules itself for the next turn.
pub(crate) fn drive(
    mut scheduler: PersistenceScheduler,
    turns: Arc<dyn TurnScheduler>,
    done: Sender<SaveOutcome>,
) {
    let next = Arc::clone(&turns);
    turns.schedule(Box::new(move || match scheduler.step() {
        Some(outcome) => {
            let _ = done.send(outcome);
        }
        None => drive(scheduler, next, done),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::NoopCompressor;
    use crate::notation::JsonNotation;
    use crate::testutil::{QueueScheduler, TestHost};
    use serde_json::json;
    use std::sync::mpsc::channel;

    fn scheduler_for(
        host: &Arc<TestHost>,
        entries: Vec<(String, Value)>,
        flags: &Arc<SaveFlags>,
    ) -> PersistenceScheduler {
        flags.set_asynchronous(true);
        PersistenceScheduler::new(
            entries,
            Arc::clone(host) as Arc<dyn PropertyStore>,
            Arc::new(JsonNotation),
            Arc::new(NoopCompressor),
            500,
            Arc::clone(flags),
        )
    }

    fn entries(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_one_entry_per_step() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(
            &host,
            entries(&[("a", json!(1)), ("b", json!(2))]),
            &flags,
        );

        assert_eq!(sched.step(), None);
        assert_eq!(host.writes(), 1);
        assert_eq!(sched.remaining(), 1);

        assert_eq!(sched.step(), None);
        assert_eq!(host.writes(), 2);

        // Exhausted iterator completes on the next turn
        assert_eq!(sched.step(), Some(SaveOutcome::Completed));
        assert!(sched.is_done());
        assert!(!flags.asynchronous_save_in_progress());
    }

    #[test]
    fn test_visitation_in_insertion_order() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(
            &host,
            entries(&[("z", json!(1)), ("a", json!(2)), ("m", json!(3))]),
            &flags,
        );
        while sched.step().is_none() {}
        assert_eq!(host.written_keys(), ["z", "a", "m"]);
    }

    #[test]
    fn test_preemption_at_turn_boundary() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(
            &host,
            entries(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]),
            &flags,
        );

        assert_eq!(sched.step(), None);
        assert_eq!(host.writes(), 1);

        // Synchronous save begins between turns
        flags.begin_synchronous();

        assert_eq!(sched.step(), Some(SaveOutcome::Preempted));
        assert!(sched.is_preempted());
        // No write happened on the preempted turn
        assert_eq!(host.writes(), 1);
        assert!(!flags.asynchronous_save_in_progress());
    }

    #[test]
    fn test_finished_sync_save_still_preempts() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(
            &host,
            entries(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]),
            &flags,
        );

        assert_eq!(sched.step(), None);
        assert_eq!(host.writes(), 1);

        // A synchronous save starts AND finishes entirely between two
        // turns, so the in-progress flag is already back down.
        flags.begin_synchronous();
        flags.end_synchronous();
        assert!(!flags.synchronous_save_in_progress());

        assert_eq!(sched.step(), Some(SaveOutcome::Preempted));
        assert_eq!(host.writes(), 1);
        assert!(!flags.asynchronous_save_in_progress());
    }

    #[test]
    fn test_per_entry_failure_does_not_stop_loop() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(
            &host,
            entries(&[("bad", json!("x")), ("good", json!("y"))]),
            &flags,
        );

        host.fail_next_write();
        assert_eq!(sched.step(), None); // failure logged, loop continues
        assert_eq!(sched.step(), None);
        assert_eq!(sched.step(), Some(SaveOutcome::Completed));

        assert_eq!(host.raw("bad"), None);
        assert_eq!(host.raw("good"), Some("\"y\"".to_string()));
    }

    #[test]
    fn test_oversized_entry_skipped() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        flags.set_asynchronous(true);
        let mut sched = PersistenceScheduler::new(
            entries(&[("big", json!("0123456789")), ("small", json!(1))]),
            Arc::clone(&host) as Arc<dyn PropertyStore>,
            Arc::new(JsonNotation),
            Arc::new(NoopCompressor),
            8, // "\"0123456789\"" is 12 bytes, over the limit
            Arc::clone(&flags),
        );

        while sched.step().is_none() {}
        assert_eq!(host.raw("big"), None);
        assert_eq!(host.raw("small"), Some("1".to_string()));
    }

    #[test]
    fn test_empty_snapshot_completes_immediately() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(&host, Vec::new(), &flags);
        assert_eq!(sched.step(), Some(SaveOutcome::Completed));
        assert_eq!(host.writes(), 0);
    }

    #[test]
    fn test_step_after_done_is_stable() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let mut sched = scheduler_for(&host, Vec::new(), &flags);
        assert_eq!(sched.step(), Some(SaveOutcome::Completed));
        assert_eq!(sched.step(), Some(SaveOutcome::Completed));
        assert_eq!(host.writes(), 0);
    }

    #[test]
    fn test_drive_schedules_one_turn_at_a_time() {
        let host = TestHost::arc();
        let flags = Arc::new(SaveFlags::new());
        let sched = scheduler_for(&host, entries(&[("a", json!(1)), ("b", json!(2))]), &flags);

        let queue = QueueScheduler::arc();
        let turns: Arc<dyn TurnScheduler> = Arc::clone(&queue) as Arc<dyn TurnScheduler>;
        let (tx, rx) = channel();
        drive(sched, turns, tx);
        let ticket = SaveTicket::new(rx);

        // One turn queued at a time
        assert_eq!(queue.pending(), 1);
        assert!(queue.run_next_turn());
        assert_eq!(host.writes(), 1);
        assert_eq!(queue.pending(), 1);
        assert!(ticket.try_outcome().is_none());

        // Two more turns: second write, then completion
        queue.run_all();
        assert_eq!(host.writes(), 2);
        assert_eq!(ticket.try_outcome(), Some(SaveOutcome::Completed));
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(SaveOutcome::Completed.code(), 0);
        assert_eq!(SaveOutcome::Preempted.code(), 2);
    }
}
