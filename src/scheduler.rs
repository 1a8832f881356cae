//! Deterministic tick scheduler
//!
//! Work deferred "to the next tick" is queued here and run when the host
//! advances the clock. Entries due on the same tick run in the order they
//! were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;

use crate::runtime::QuestRuntime;

/// Deferred work, run with the runtime it was scheduled on
pub type Continuation = Box<dyn FnOnce(&QuestRuntime) + Send>;

struct Scheduled {
    due: u64,
    seq: u64,
    run: Continuation,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.seq) == (other.due, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest tick, then earliest scheduled)
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

struct Queue {
    tick: u64,
    next_seq: u64,
    heap: BinaryHeap<Scheduled>,
}

pub struct TickScheduler {
    queue: Mutex<Queue>,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                tick: 0,
                next_seq: 0,
                heap: BinaryHeap::new(),
            }),
        }
    }

    /// Current tick number
    pub fn tick(&self) -> u64 {
        self.queue.lock().tick
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().heap.len()
    }

    /// Run `run` after `ticks` ticks (at least one)
    pub fn schedule_after(&self, ticks: u64, run: Continuation) {
        let mut queue = self.queue.lock();
        let due = queue.tick + ticks.max(1);
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Scheduled { due, seq, run });
    }

    pub fn schedule_next_tick(&self, run: Continuation) {
        self.schedule_after(1, run);
    }

    /// Advance one tick and run everything now due. Work scheduled while
    /// running lands on a later tick. Returns how many entries ran.
    pub fn advance(&self, rt: &QuestRuntime) -> usize {
        let due = {
            let mut queue = self.queue.lock();
            queue.tick += 1;
            let now = queue.tick;
            let mut due = Vec::new();
            while queue.heap.peek().is_some_and(|s| s.due <= now) {
                if let Some(entry) = queue.heap.pop() {
                    due.push(entry.run);
                }
            }
            due
        };

        let count = due.len();
        for run in due {
            run(rt);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::Fixture;

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> Continuation {
        let log = log.clone();
        Box::new(move |_: &QuestRuntime| log.lock().push(entry))
    }

    #[test]
    fn test_runs_in_due_then_schedule_order() {
        let fixture = Fixture::new("");
        let scheduler = fixture.rt.scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.schedule_after(2, record(&log, "later"));
        scheduler.schedule_next_tick(record(&log, "first"));
        scheduler.schedule_after(0, record(&log, "second"));
        assert_eq!(scheduler.pending_count(), 3);

        assert_eq!(fixture.rt.tick(), 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert_eq!(fixture.rt.tick(), 1);
        assert_eq!(*log.lock(), vec!["first", "second", "later"]);
        assert_eq!(scheduler.tick(), 2);
    }

    #[test]
    fn test_work_scheduled_while_running_waits() {
        let fixture = Fixture::new("");
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = record(&log, "inner");
        let outer_log = log.clone();
        fixture.rt.scheduler().schedule_next_tick(Box::new(move |rt: &QuestRuntime| {
            outer_log.lock().push("outer");
            rt.scheduler().schedule_next_tick(inner);
        }));

        assert_eq!(fixture.rt.tick(), 1);
        assert_eq!(*log.lock(), vec!["outer"]);
        assert_eq!(fixture.rt.tick(), 1);
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
        assert_eq!(fixture.rt.tick(), 0);
    }
}
