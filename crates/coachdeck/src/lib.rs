//! CoachDeck dashboard sync layer
//!
//! Keeps local, owner-scoped mirrors of the hosted backend's tables in step
//! with its change feeds, derives dashboard figures from them, and routes
//! every user action through a guarded dispatcher that only merges rows the
//! remote side confirmed.
//!
//! - [`core`]: the entity sync hook and its reconciliation rules
//! - [`store`]: the remote store contract and an in-memory implementation
//! - [`views`]: rates, leaderboards and other derived state
//! - [`actions`]: the action dispatcher and the concrete actions
//! - [`billing`]: the subscription lifecycle and entitlement
//! - [`import`]: CSV client import
//! - [`workflow`]: the workflow editor
//! - [`session`]: the process-wide session accessor

pub mod actions;
pub mod billing;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod import;
pub mod session;
pub mod store;
pub mod testing;
pub mod views;
pub mod workflow;

pub use actions::{ActionDispatcher, ActionKey, ActionObserver};
pub use billing::{BillingEvent, BillingEventKind, BillingLifecycle, BillingState, EventSource};
pub use config::AppConfig;
pub use crate::core::{EntitySync, MergeOutcome, SyncOutcome, SyncState};
pub use import::{ClientField, ColumnMapping, ImportSummary};
pub use session::{Session, SessionContext, session};
pub use store::{Filter, MemoryStore, Order, Query, RemoteStore};
pub use workflow::WorkflowEditor;

pub use coachdeck_api as api;
