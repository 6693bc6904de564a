//! Frontier queue, visited set, and the combined crawler state
//!
//! The frontier and visited set are only ever mutated through
//! [`CrawlerState`], which checks membership across the queue, the visited
//! set and the tasks currently in flight in one step. Callers share it behind
//! a single mutex.

use crate::state::CrawlTask;
use crate::url::NormalizedKey;
use std::collections::{HashSet, VecDeque};

/// Keys that have been completed, successfully or permanently failed
///
/// Grows monotonically for the lifetime of a run.
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: HashSet<NormalizedKey>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the key has been completed
    pub fn has_visited(&self, key: &NormalizedKey) -> bool {
        self.keys.contains(key)
    }

    /// Records the key as completed; returns false if it already was
    pub fn mark_visited(&mut self, key: NormalizedKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// FIFO queue of pending tasks with a membership index
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    queued: HashSet<NormalizedKey>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a task with this key is waiting in the queue
    pub fn contains(&self, key: &NormalizedKey) -> bool {
        self.queued.contains(key)
    }

    fn push_back(&mut self, task: CrawlTask) {
        self.queued.insert(task.key.clone());
        self.queue.push_back(task);
    }

    fn push_front(&mut self, task: CrawlTask) {
        self.queued.insert(task.key.clone());
        self.queue.push_front(task);
    }

    fn pop_front(&mut self) -> Option<CrawlTask> {
        let task = self.queue.pop_front()?;
        self.queued.remove(&task.key);
        Some(task)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterates over pending tasks in pop order
    pub fn iter(&self) -> impl Iterator<Item = &CrawlTask> {
        self.queue.iter()
    }
}

/// Where a key currently sits in the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Never seen
    Unknown,
    /// Waiting in the frontier
    Queued,
    /// Popped by a worker and not yet completed
    InFlight,
    /// Completed
    Visited,
}

/// The crawl's mutable state: frontier, in-flight keys, and visited set
///
/// # Invariants
///
/// - A key is in at most one of: frontier, in-flight, visited
/// - A key appears at most once in the frontier
/// - The visited set never shrinks
#[derive(Debug, Default)]
pub struct CrawlerState {
    frontier: Frontier,
    in_flight: HashSet<NormalizedKey>,
    visited: VisitedSet,
}

impl CrawlerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports where a key currently sits
    pub fn status(&self, key: &NormalizedKey) -> KeyStatus {
        if self.visited.has_visited(key) {
            KeyStatus::Visited
        } else if self.in_flight.contains(key) {
            KeyStatus::InFlight
        } else if self.frontier.contains(key) {
            KeyStatus::Queued
        } else {
            KeyStatus::Unknown
        }
    }

    /// Returns true if the key is queued, in flight, or visited
    pub fn is_known(&self, key: &NormalizedKey) -> bool {
        self.status(key) != KeyStatus::Unknown
    }

    /// Appends a task unless its key is already known
    ///
    /// Returns true if the task was queued.
    pub fn push(&mut self, task: CrawlTask) -> bool {
        if self.is_known(&task.key) {
            tracing::trace!("Skipping known key {}", task.key);
            return false;
        }
        self.frontier.push_back(task);
        true
    }

    /// Pops the oldest task and marks its key as in flight
    pub fn pop_next(&mut self) -> Option<CrawlTask> {
        let task = self.frontier.pop_front()?;
        self.in_flight.insert(task.key.clone());
        Some(task)
    }

    /// Returns an in-flight task to the frontier for another attempt
    ///
    /// `front` puts it at the head of the queue so it is the next task
    /// popped. Returns false (and drops the task) if the key is not in
    /// flight, which would mean it was completed or re-queued already.
    pub fn requeue(&mut self, task: CrawlTask, front: bool) -> bool {
        if !self.in_flight.remove(&task.key) {
            tracing::warn!("Refusing to re-queue {}: not in flight", task.key);
            return false;
        }
        if front {
            self.frontier.push_front(task);
        } else {
            self.frontier.push_back(task);
        }
        true
    }

    /// Completes a key, successfully or as a permanent failure
    pub fn mark_visited(&mut self, key: &NormalizedKey) {
        self.in_flight.remove(key);
        self.visited.mark_visited(key.clone());
    }

    /// Returns true if the key has been completed
    pub fn has_visited(&self, key: &NormalizedKey) -> bool {
        self.visited.has_visited(key)
    }

    /// Removes and returns every pending task (used on cancellation)
    pub fn drain_pending(&mut self) -> Vec<CrawlTask> {
        let mut drained = Vec::with_capacity(self.frontier.len());
        while let Some(task) = self.frontier.pop_front() {
            drained.push(task);
        }
        drained
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn pending(&self) -> usize {
        self.frontier.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// True when nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        self.frontier.is_empty() && self.in_flight.is_empty()
    }
}
