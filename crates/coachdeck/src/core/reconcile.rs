//! Merge rules for applying change notifications to a local collection.
//!
//! The feed gives at-least-once delivery with no ordering guarantee, so every
//! rule here is idempotent: applying the same change twice leaves the
//! collection as applying it once did.

use coachdeck_api::{Change, SyncedEntity};

/// What a merge did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    Ignored(IgnoreReason),
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Ignored(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Insert for an id already present
    Duplicate,
    /// Update or delete for an id not present
    Absent,
    /// Update older than the local copy
    Stale,
}

/// Apply one change to `items`.
///
/// - insert appends only when the id is not already present
/// - update replaces the matching item in place, and never inserts
/// - delete removes the matching item, and is a no-op when absent
pub fn apply_change<T: SyncedEntity>(items: &mut Vec<T>, change: Change<T>) -> MergeOutcome {
    match change {
        Change::Created { data, .. } => {
            if position(items, data.id()).is_some() {
                return MergeOutcome::Ignored(IgnoreReason::Duplicate);
            }
            items.push(data);
            MergeOutcome::Inserted
        }
        Change::Updated { id, data, .. } => match position(items, &id) {
            Some(index) => {
                if data.updated_at() < items[index].updated_at() {
                    return MergeOutcome::Ignored(IgnoreReason::Stale);
                }
                items[index] = data;
                MergeOutcome::Replaced
            }
            None => MergeOutcome::Ignored(IgnoreReason::Absent),
        },
        Change::Deleted { id, .. } => match position(items, &id) {
            Some(index) => {
                items.remove(index);
                MergeOutcome::Removed
            }
            None => MergeOutcome::Ignored(IgnoreReason::Absent),
        },
    }
}

/// Insert or replace by id. Used for rows a local write got back from the
/// store, which are authoritative and may arrive before or after their feed echo.
pub fn upsert<T: SyncedEntity>(items: &mut Vec<T>, item: T) -> MergeOutcome {
    match position(items, item.id()) {
        Some(index) => {
            if item.updated_at() < items[index].updated_at() {
                return MergeOutcome::Ignored(IgnoreReason::Stale);
            }
            items[index] = item;
            MergeOutcome::Replaced
        }
        None => {
            items.push(item);
            MergeOutcome::Inserted
        }
    }
}

pub fn remove<T: SyncedEntity>(items: &mut Vec<T>, id: &str) -> MergeOutcome {
    match position(items, id) {
        Some(index) => {
            items.remove(index);
            MergeOutcome::Removed
        }
        None => MergeOutcome::Ignored(IgnoreReason::Absent),
    }
}

fn position<T: SyncedEntity>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}
