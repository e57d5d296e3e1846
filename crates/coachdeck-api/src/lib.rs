//! Shared types for the CoachDeck dashboard sync layer.
//!
//! Everything in here is technology-agnostic: entity rows, change events,
//! the error taxonomy and the tagged configuration payloads. The sync engine
//! (`coachdeck`) and the HTTP collaborator clients (`coachdeck-services`)
//! both depend on this crate and nothing else in the workspace.

use serde::{Deserialize, Serialize};

pub mod entities;
pub mod entity;
pub mod payload;
pub mod streaming;

pub use entities::{
    AccountabilityMember, BillingStatus, BuddyMessage, Client, EmailMetric, Subscription, Task,
    Workflow, WorkflowNode,
};
pub use entity::{OwnerScope, Row, SyncedEntity};
pub use payload::{BrandAttribute, KnownBrandAttribute, KnownNodeConfig, NodeConfig, OpaquePayload};
pub use streaming::{
    Change, ChangeEvent, ChangeFeed, ChangeKind, ChangeOrigin, FeedEvent, FeedGuard,
};

/// Structured error types shared by the sync engine and the collaborator clients.
///
/// The variants follow the error taxonomy of the dashboard: scope errors are
/// fatal to the operation, "not found" is an expected outcome, store and
/// collaborator failures are surfaced to the user, and malformed change
/// events are logged and dropped by the reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("No authenticated identity")]
    Unauthenticated,

    #[error("Row not found: {table}/{id}")]
    NotFound { table: String, id: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("{service} failed: {message}")]
    Collaborator { service: String, message: String },

    #[error("Malformed change event on {table}: {message}")]
    MalformedChange { table: String, message: String },

    #[error("Action already in flight: {key}")]
    AlreadyInFlight { key: String },

    #[error("Invalid billing transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl ApiError {
    pub fn store(message: impl Into<String>) -> Self {
        ApiError::Store {
            message: message.into(),
        }
    }

    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApiError::InvalidInput {
            message: message.into(),
        }
    }

    /// True for the expected "no matching row" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ApiError::collaborator("stripe", "card declined");
        assert_eq!(err.to_string(), "stripe failed: card declined");

        let err = ApiError::NotFound {
            table: "clients".to_string(),
            id: "42".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Row not found: clients/42");
    }

    #[test]
    fn test_error_serializes_for_frontends() {
        let err = ApiError::AlreadyInFlight {
            key: "send_invitation:7".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: ApiError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
