pub mod entity_sync;
pub mod reconcile;

pub use entity_sync::{EntitySync, SyncOutcome, SyncState};
pub use reconcile::{apply_change, IgnoreReason, MergeOutcome};
