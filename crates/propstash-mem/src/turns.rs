//! Manually driven `TurnScheduler` implementation.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use propstash_core::{Turn, TurnScheduler};

/// FIFO turn queue drained explicitly by the embedder.
///
/// `schedule` only enqueues; nothing runs until `run_next_turn` or
/// `run_all` is called. This makes the interleaving of incremental save
/// turns with other work fully controllable, which is the point: tests
/// can run exactly N turns, do something synchronous, then drain the rest.
#[derive(Default)]
pub struct ManualTurnScheduler {
    queue: Mutex<VecDeque<Turn>>,
}

impl ManualTurnScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scheduler behind an Arc.
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Turns waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Pop and run one queued turn; false if the queue was empty.
    /// The queue lock is released before the turn runs, so a turn may
    /// reschedule itself.
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

    /// Run turns until the queue drains, including turns scheduled while
    /// draining. Returns the number executed.
    pub fn run_all(&self) -> usize {
        let mut executed = 0;
        while self.run_next_turn() {
            executed += 1;
        }
        executed
    }
}

impl TurnScheduler for ManualTurnScheduler {
    fn schedule(&self, turn: Turn) {
        self.queue.lock().push_back(turn);
    }
}
