//! In-memory implementation of [`RemoteStore`]
//!
//! A HashMap-backed store used by the tests and the CLI's offline mode. It
//! behaves like the hosted backend where the sync layer can observe it:
//! writes return the committed row, every mutation is pushed to matching
//! subscribers, and a closed subscriber is dropped on the next emit.
//!
//! It also lets tests misbehave on purpose: [`MemoryStore::push_event`]
//! delivers arbitrary (duplicate, out-of-order, malformed) events,
//! [`MemoryStore::fail_next`] injects a failure, and
//! [`MemoryStore::set_query_delay`] holds a query open long enough for a
//! teardown to race it.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use coachdeck_api::{
    ApiError, ChangeEvent, ChangeFeed, FeedEvent, OwnerScope, Result, Row,
};

use super::{Filter, Query, RemoteStore, not_found, row_id};

const FEED_CAPACITY: usize = 256;

/// Store operation, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Query,
    Insert,
    Update,
    Delete,
    Subscribe,
}

struct Subscriber {
    id: u64,
    table: String,
    filter: Filter,
    tx: mpsc::Sender<FeedEvent>,
}

#[derive(Default)]
struct MemoryState {
    /// Rows by table, in insertion order
    tables: HashMap<String, Vec<Row>>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    next_subscriber_id: u64,
    calls: HashMap<StoreOp, usize>,
    failures: HashMap<StoreOp, ApiError>,
    query_delay: Option<Duration>,
}

impl MemoryState {
    fn record_call(&mut self, op: StoreOp) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Deliver to every live subscriber whose table and filter match.
    fn emit(&mut self, event: ChangeEvent) {
        let subject = match &event.record {
            Some(record) => record.clone(),
            None => event.old_record.clone().unwrap_or_default(),
        };
        self.subscribers.retain(|sub| {
            if sub.table != event.table || !sub.filter.matches(&subject) {
                return true;
            }
            match sub.tx.try_send(FeedEvent::Change(event.clone())) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "[MemoryStore] Subscriber {} on '{}' is full, dropping event",
                        sub.id, sub.table
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// HashMap-backed [`RemoteStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryStore")
            .field("tables", &state.tables.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert rows without assigning ids or emitting events.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.lock();
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Deliver an event to matching subscribers without touching stored rows.
    pub fn push_event(&self, event: ChangeEvent) {
        self.lock().emit(event);
    }

    /// Deliver an event to every subscriber of its table, ignoring their
    /// filters, as a backend with a broken server-side filter would.
    pub fn push_event_unfiltered(&self, event: ChangeEvent) {
        let mut state = self.lock();
        state.subscribers.retain(|sub| {
            sub.table != event.table
                || !matches!(
                    sub.tx.try_send(FeedEvent::Change(event.clone())),
                    Err(mpsc::error::TrySendError::Closed(_))
                )
        });
    }

    /// Signal every subscriber that the connection was re-established.
    pub fn push_reconnect(&self) {
        let mut state = self.lock();
        state.subscribers.retain(|sub| {
            !matches!(
                sub.tx.try_send(FeedEvent::Reconnected),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: StoreOp, err: ApiError) {
        self.lock().failures.insert(op, err);
    }

    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.lock().query_delay = delay;
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Subscriptions not yet released, optionally for one table.
    pub fn active_subscriptions(&self, table: Option<&str>) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|sub| table.is_none_or(|t| sub.table == t) && !sub.tx.is_closed())
            .count()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let delay = {
            let mut state = self.lock();
            state.record_call(StoreOp::Query)?;
            state.query_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        let mut rows: Vec<Row> = state
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        debug!(
            "[MemoryStore] query {} returned {} rows",
            query.table,
            rows.len()
        );
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut state = self.lock();
        state.record_call(StoreOp::Insert)?;

        let now = Value::String(Utc::now().to_rfc3339());
        let mut committed = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row_id(&row).is_none_or(|id| id.is_empty()) {
                state.next_id += 1;
                row.insert("id".to_string(), Value::String(format!("mem-{}", state.next_id)));
            }
            for column in ["created_at", "updated_at"] {
                if row.get(column).is_none_or(Value::is_null) {
                    row.insert(column.to_string(), now.clone());
                }
            }
            committed.push(row);
        }

        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(committed.iter().cloned());
        for row in &committed {
            state.emit(ChangeEvent::insert(table, row.clone()));
        }
        Ok(committed)
    }

    async fn update(&self, table: &str, scope: &OwnerScope, id: &str, patch: Row) -> Result<Row> {
        let mut state = self.lock();
        state.record_call(StoreOp::Update)?;

        let owner = Filter::owner("user_id", scope);
        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row_id(row).as_deref() == Some(id) && owner.matches(row))
            })
            .ok_or_else(|| not_found(table, id))?;

        for (column, value) in patch {
            if column != "id" {
                row.insert(column, value);
            }
        }
        row.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        let committed = row.clone();

        state.emit(ChangeEvent::update(table, committed.clone()));
        Ok(committed)
    }

    async fn delete(&self, table: &str, scope: &OwnerScope, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record_call(StoreOp::Delete)?;

        let owner = Filter::owner("user_id", scope);
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table, id))?;
        let position = rows
            .iter()
            .position(|row| row_id(row).as_deref() == Some(id) && owner.matches(row))
            .ok_or_else(|| not_found(table, id))?;
        let removed = rows.remove(position);

        state.emit(ChangeEvent::delete(table, removed));
        Ok(())
    }

    async fn subscribe(&self, table: &str, filter: Filter) -> Result<ChangeFeed> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let id = {
            let mut state = self.lock();
            state.record_call(StoreOp::Subscribe)?;
            state.next_subscriber_id += 1;
            let id = state.next_subscriber_id;
            state.subscribers.push(Subscriber {
                id,
                table: table.to_string(),
                filter,
                tx,
            });
            id
        };
        debug!("[MemoryStore] subscriber {} opened on '{}'", id, table);

        let state = Arc::downgrade(&self.state);
        Ok(ChangeFeed::new(rx, move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.subscribers.retain(|sub| sub.id != id);
            }
        }))
    }
}
