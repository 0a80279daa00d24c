//! Deferred effects.
//!
//! A min-heap of timers on the session's logical millisecond clock.
//! Ties on the due time fire in scheduling order. Every entry is
//! stamped with the round epoch it was scheduled in; the owner drops
//! entries whose epoch is stale.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::game::state::PlayerId;

/// What a timer does when it fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// One second of the waiting timer elapsed.
    WaitingTick,
    /// One second of the countdown elapsed.
    CountdownTick,
    /// Return a hit player to their spawn corner.
    Respawn {
        player: PlayerId,
    },
    /// End a player's immunity window.
    ImmunityClear {
        player: PlayerId,
    },
    /// Wipe the finished round.
    RoundReset,
}

/// A timer entry.
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    /// Logical time it fires at.
    pub due_ms: u64,
    /// Insertion order, breaks ties.
    pub seq: u64,
    /// Round epoch at scheduling time.
    pub epoch: u64,
    /// Effect.
    pub kind: TimerKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_ms, self.seq).cmp(&(other.due_ms, other.seq))
    }
}

/// Timer queue.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<ScheduledEvent>>,
    next_seq: u64,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire at `due_ms`.
    pub fn schedule_at(&mut self, due_ms: u64, epoch: u64, kind: TimerKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(ScheduledEvent { due_ms, seq, epoch, kind }));
    }

    /// Pop the earliest entry if it is due at `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<ScheduledEvent> {
        match self.queue.peek() {
            Some(Reverse(next)) if next.due_ms <= now_ms => self.queue.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    /// Due time of the earliest entry.
    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(e)| e.due_ms)
    }

    /// Drop every entry whose kind matches `pred`. Returns how many were dropped.
    pub fn cancel<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&TimerKind) -> bool,
    {
        let before = self.queue.len();
        self.queue.retain(|Reverse(e)| !pred(&e.kind));
        before - self.queue.len()
    }

    /// Check if any entry matches `pred`.
    pub fn contains<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&TimerKind) -> bool,
    {
        self.queue.iter().any(|Reverse(e)| pred(&e.kind))
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
