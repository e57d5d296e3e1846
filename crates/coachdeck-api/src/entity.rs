//! The row contract every synced collection follows.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ApiError;

/// A raw row as it travels to and from the remote store.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The authenticated-owner filter applied to every query and subscription.
///
/// Construction rejects empty identities, so holding an `OwnerScope` means a
/// session was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerScope(String);

impl OwnerScope {
    pub fn new(owner_id: impl Into<String>) -> Result<Self, ApiError> {
        let owner_id = owner_id.into();
        let trimmed = owner_id.trim();
        if trimmed.is_empty() {
            return Err(ApiError::Unauthenticated);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerScope {
    type Error = ApiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OwnerScope::new(value)
    }
}

impl From<OwnerScope> for String {
    fn from(scope: OwnerScope) -> Self {
        scope.0
    }
}

/// A row-shaped record with a stable identifier, an owner and a last-write
/// timestamp.
///
/// The server holds the only authoritative copy; anything implementing this
/// trait locally is a cache of it.
pub trait SyncedEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Remote table backing this entity
    const TABLE: &'static str;
    /// Column holding the owning user's id
    const OWNER_COLUMN: &'static str = "user_id";
    /// Default ordering column for the initial snapshot (descending)
    const ORDER_COLUMN: &'static str = "created_at";

    fn id(&self) -> &str;

    fn owner_id(&self) -> &str;

    fn updated_at(&self) -> DateTime<Utc>;

    fn from_row(row: Row) -> Result<Self, ApiError> {
        serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
            ApiError::MalformedChange {
                table: Self::TABLE.to_string(),
                message: e.to_string(),
            }
        })
    }

    fn to_row(&self) -> Result<Row, ApiError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(row)) => Ok(row),
            Ok(other) => Err(ApiError::invalid_input(format!(
                "{} did not serialize to an object: {}",
                Self::TABLE,
                other
            ))),
            Err(e) => Err(ApiError::invalid_input(e.to_string())),
        }
    }
}
