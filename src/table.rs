//! Generation-checked work handle table.
//!
//! Single source of truth for all live work items. Items live in a slab
//! arena; handles pair the slab slot with a generation stamped at insert, so
//! a handle to a deleted item is rejected even after the slot is reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slab::Slab;

use crate::event_loop::EngineHandle;
use crate::model::{CompleteFn, ExecuteFn, WorkCounts, WorkSnapshot, WorkState};
use crate::pool::PoolHandle;

/// Handle to a work item: slab slot plus the generation the slot held when
/// the item was inserted. Stale handles fail every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.slot, self.generation)
    }
}

/// One tracked unit of offloaded work. Field-for-field the bridge's view:
/// callback slots are `Option` so taking them enforces at-most-once and
/// exactly-once structurally.
pub(crate) struct WorkItem {
    pub(crate) resource_name: String,
    pub(crate) resource_tag: Option<String>,

    /// Submission handle minted from the pool at creation, released at
    /// deletion. Exclusively owned by this item in between.
    pub(crate) pool_handle: PoolHandle,

    /// Posting side of the engine loop. Not owned; used only to locate the
    /// loop when the done slot fires.
    pub(crate) engine: EngineHandle,

    pub(crate) execute: Option<ExecuteFn>,
    pub(crate) complete: Option<CompleteFn>,

    pub(crate) state: WorkState,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub(crate) fn snapshot(&self, id: WorkId) -> WorkSnapshot {
        WorkSnapshot {
            id,
            resource_name: self.resource_name.clone(),
            resource_tag: self.resource_tag.clone(),
            state: self.state,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

struct Entry {
    generation: u32,
    item: WorkItem,
}

/// The arena. All access goes through a `WorkId`, all lookups check the
/// generation.
pub(crate) struct WorkTable {
    entries: Slab<Entry>,
    next_generation: u32,
}

impl WorkTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Slab::new(),
            next_generation: 1,
        }
    }

    pub(crate) fn insert(&mut self, item: WorkItem) -> WorkId {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let slot = self.entries.insert(Entry { generation, item }) as u32;
        WorkId { slot, generation }
    }

    pub(crate) fn get(&self, id: WorkId) -> Option<&WorkItem> {
        self.entries
            .get(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .map(|entry| &entry.item)
    }

    pub(crate) fn get_mut(&mut self, id: WorkId) -> Option<&mut WorkItem> {
        self.entries
            .get_mut(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .map(|entry| &mut entry.item)
    }

    pub(crate) fn remove(&mut self, id: WorkId) -> Option<WorkItem> {
        match self.entries.get(id.slot as usize) {
            Some(entry) if entry.generation == id.generation => {
                Some(self.entries.remove(id.slot as usize).item)
            }
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn counts(&self) -> WorkCounts {
        let mut counts = WorkCounts::default();
        for (_, entry) in self.entries.iter() {
            match entry.item.state {
                WorkState::Created => counts.created += 1,
                WorkState::Queued => counts.queued += 1,
                WorkState::Executing => counts.executing += 1,
                WorkState::Completed => counts.completed += 1,
                WorkState::Cancelled => counts.cancelled += 1,
                WorkState::Failed => counts.failed += 1,
                WorkState::Retired => counts.retired += 1,
            }
        }
        counts
    }
}
