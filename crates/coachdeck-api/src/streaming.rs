use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::entity::{Row, SyncedEntity};
use crate::ApiError;

/// Origin of a change (local confirmed write vs. remote push).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Row returned by a write this client made and the store confirmed
    Local { operation_id: Option<String> },
    /// Row delivered by the store's change feed
    Remote { operation_id: Option<String> },
}

impl ChangeOrigin {
    pub fn remote() -> Self {
        Self::Remote { operation_id: None }
    }

    pub fn local(operation_id: impl Into<String>) -> Self {
        Self::Local {
            operation_id: Some(operation_id.into()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

/// Typed change notification, decoded from a [`ChangeEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Change<T> {
    Created { data: T, origin: ChangeOrigin },
    Updated {
        id: String,
        data: T,
        origin: ChangeOrigin,
    },
    Deleted { id: String, origin: ChangeOrigin },
}

impl<T> Change<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Created { .. } => ChangeKind::Insert,
            Change::Updated { .. } => ChangeKind::Update,
            Change::Deleted { .. } => ChangeKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A change notification as the store client delivers it.
///
/// The payload is untyped: decoding into an entity happens in the
/// reconciliation loop, where a malformed event is dropped rather than
/// allowed to take down the view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<Row>,
    #[serde(default)]
    pub old_record: Option<Row>,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, record: Row) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            record: Some(record),
            old_record: None,
            commit_timestamp: Some(Utc::now()),
        }
    }

    pub fn update(table: impl Into<String>, record: Row) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            record: Some(record),
            old_record: None,
            commit_timestamp: Some(Utc::now()),
        }
    }

    pub fn delete(table: impl Into<String>, old_record: Row) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            record: None,
            old_record: Some(old_record),
            commit_timestamp: Some(Utc::now()),
        }
    }

    /// The row carrying the event's identity: the new record for inserts and
    /// updates, the old record for deletes.
    fn subject(&self) -> Option<&Row> {
        match self.kind {
            ChangeKind::Insert | ChangeKind::Update => self.record.as_ref(),
            ChangeKind::Delete => self.old_record.as_ref(),
        }
    }

    pub fn record_id(&self) -> Option<String> {
        self.subject().and_then(|row| row_string(row, "id"))
    }

    /// Owner of the affected row, if the payload carries it.
    pub fn owner(&self, owner_column: &str) -> Option<String> {
        self.subject().and_then(|row| row_string(row, owner_column))
    }

    /// Decode into a typed change for entity `T`.
    pub fn decode<T: SyncedEntity>(&self) -> Result<Change<T>, ApiError> {
        let malformed = |message: String| ApiError::MalformedChange {
            table: self.table.clone(),
            message,
        };

        if self.table != T::TABLE {
            return Err(malformed(format!(
                "event for table '{}' delivered to '{}' mirror",
                self.table,
                T::TABLE
            )));
        }

        let origin = ChangeOrigin::remote();
        match self.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let record = self
                    .record
                    .clone()
                    .ok_or_else(|| malformed(format!("{} without record", self.kind)))?;
                let data = T::from_row(record)?;
                if data.id().is_empty() {
                    return Err(malformed("record has an empty id".to_string()));
                }
                Ok(match self.kind {
                    ChangeKind::Insert => Change::Created { data, origin },
                    _ => Change::Updated {
                        id: data.id().to_string(),
                        data,
                        origin,
                    },
                })
            }
            ChangeKind::Delete => {
                let id = self
                    .record_id()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| malformed("DELETE without old_record.id".to_string()))?;
                Ok(Change::Deleted { id, origin })
            }
        }
    }
}

/// Read a column as a string, accepting numeric identifiers too.
fn row_string(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Item delivered on a change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Change(ChangeEvent),
    /// The store client lost and re-established its connection. Events may
    /// have been missed; mirrors must re-initialize.
    Reconnected,
}

/// Releases a subscription on the producer side when dropped.
pub struct FeedGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Run the release hook now. Later calls (and the drop) are no-ops.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FeedGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedGuard")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Consumer end of a push subscription.
///
/// Producer is the store client, consumer is the reconciliation loop.
/// Dropping the feed (or calling [`ChangeFeed::unsubscribe`]) releases the
/// subscription on the producer side.
#[derive(Debug)]
pub struct ChangeFeed {
    events: mpsc::Receiver<FeedEvent>,
    guard: FeedGuard,
}

impl ChangeFeed {
    pub fn new(
        events: mpsc::Receiver<FeedEvent>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            guard: FeedGuard::new(on_unsubscribe),
        }
    }

    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(&mut self) {
        self.guard.release();
        self.events.close();
    }

    pub fn is_subscribed(&self) -> bool {
        self.guard.is_active()
    }

    /// Split into the receiving end and the release guard, so a consumer
    /// task can own the receiver while its owner keeps the guard.
    pub fn into_parts(self) -> (mpsc::Receiver<FeedEvent>, FeedGuard) {
        (self.events, self.guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Task;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn task_row(id: &str) -> Row {
        row(json!({
            "id": id,
            "user_id": "u1",
            "title": "Write intro email",
            "completed": false,
            "priority": 2,
            "created_at": "2026-01-01T10:00:00Z",
            "updated_at": "2026-01-01T10:00:00Z"
        }))
    }

    #[test]
    fn test_decode_insert_update_delete() {
        let created = ChangeEvent::insert("tasks", task_row("t1"))
            .decode::<Task>()
            .unwrap();
        assert!(matches!(created, Change::Created { ref data, .. } if data.id == "t1"));

        let updated = ChangeEvent::update("tasks", task_row("t1"))
            .decode::<Task>()
            .unwrap();
        assert!(matches!(updated, Change::Updated { ref id, .. } if id == "t1"));

        let deleted = ChangeEvent::delete("tasks", row(json!({"id": 7})))
            .decode::<Task>()
            .unwrap();
        assert!(matches!(deleted, Change::Deleted { ref id, .. } if id == "7"));
    }

    #[test]
    fn test_decode_rejects_malformed_events() {
        let missing_record = ChangeEvent {
            table: "tasks".to_string(),
            kind: ChangeKind::Insert,
            record: None,
            old_record: None,
            commit_timestamp: None,
        };
        assert!(matches!(
            missing_record.decode::<Task>(),
            Err(ApiError::MalformedChange { .. })
        ));

        let wrong_table = ChangeEvent::insert("clients", task_row("t1"));
        assert!(wrong_table.decode::<Task>().is_err());

        let bad_types = ChangeEvent::insert("tasks", row(json!({"id": "t1", "title": 5})));
        assert!(bad_types.decode::<Task>().is_err());

        let delete_without_id = ChangeEvent::delete("tasks", row(json!({"user_id": "u1"})));
        assert!(delete_without_id.decode::<Task>().is_err());
    }

    #[test]
    fn test_wire_format() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "table": "tasks",
            "type": "DELETE",
            "old_record": {"id": "t9", "user_id": "u2"}
        }))
        .unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.owner("user_id").as_deref(), Some("u2"));
        assert_eq!(event.record_id().as_deref(), Some("t9"));
    }

    #[tokio::test]
    async fn test_change_feed_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let (tx, rx) = mpsc::channel(4);
        let mut feed = ChangeFeed::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(FeedEvent::Reconnected).await.unwrap();
        assert_eq!(feed.recv().await, Some(FeedEvent::Reconnected));

        feed.unsubscribe();
        assert!(!feed.is_subscribed());
        drop(feed);

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(tx.is_closed());
    }
}
