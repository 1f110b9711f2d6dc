use crate::service::types::RatePermit;
use crate::task::types::{Task, TaskId, TaskOutcome};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;
use tokio::sync::oneshot;

/// A task waiting for a worker, together with everything needed to finish it
pub struct PendingEntry {
    pub task: Task,
    pub permit: RatePermit,
    pub responder: oneshot::Sender<TaskOutcome>,
    pub enqueued_at: Instant,
}

/// Priority queue over pending tasks.
///
/// Entries are grouped into tiers by priority value; dispatch always takes
/// from the highest non-empty tier, oldest entry first. Tasks of equal
/// priority therefore run in submission order.
pub struct PendingQueue {
    tiers: BTreeMap<u8, VecDeque<PendingEntry>>,
    len: usize,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            tiers: BTreeMap::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, entry: PendingEntry) {
        let tier = entry.task.priority.value();
        self.tiers.entry(tier).or_default().push_back(entry);
        self.len += 1;
    }

    /// Take the next entry to dispatch, if any
    pub fn pop_next(&mut self) -> Option<PendingEntry> {
        let (&tier, _) = self.tiers.last_key_value()?;
        let queue = self.tiers.get_mut(&tier)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            self.tiers.remove(&tier);
        }
        if entry.is_some() {
            self.len -= 1;
        }
        entry
    }

    /// Remove a specific task wherever it sits in the queue
    pub fn remove(&mut self, task_id: TaskId) -> Option<PendingEntry> {
        let mut found: Option<(u8, usize)> = None;
        for (&tier, queue) in self.tiers.iter() {
            if let Some(position) = queue.iter().position(|entry| entry.task.id == task_id) {
                found = Some((tier, position));
                break;
            }
        }
        let (tier, position) = found?;
        let queue = self.tiers.get_mut(&tier)?;
        let entry = queue.remove(position);
        if queue.is_empty() {
            self.tiers.remove(&tier);
        }
        if entry.is_some() {
            self.len -= 1;
        }
        entry
    }

    /// Remove every entry, highest priority first
    pub fn drain(&mut self) -> Vec<PendingEntry> {
        let mut entries = Vec::with_capacity(self.len);
        while let Some(entry) = self.pop_next() {
            entries.push(entry);
        }
        entries
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
