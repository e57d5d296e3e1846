//! Entity sync hook: a live, owner-scoped mirror of one remote collection.
//!
//! Lifecycle is explicit: [`EntitySync::initialize`] loads the snapshot,
//! [`EntitySync::subscribe`] starts the reconciliation task, and
//! [`EntitySync::teardown`] (also run on drop) unsubscribes synchronously.
//! Results arriving after teardown, or after a newer initialize, are
//! discarded by an epoch check.
//!
//! Feed inserts land at their place under the mirror's order. A reconnect
//! marks the mirror stale and refetches the snapshot; stale clears once the
//! refetch lands.

use std::cmp;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use coachdeck_api::{
    ApiError, ChangeEvent, FeedEvent, FeedGuard, OwnerScope, Result, Row, SyncedEntity,
};

use super::reconcile::{self, MergeOutcome};
use crate::store::{Filter, Order, Query, RemoteStore};
use crate::views::CollectionObserver;

/// Observable state of a mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<ApiError>,
    /// The store client reconnected; events may have been missed
    pub stale: bool,
    pub subscribed: bool,
}

impl<T> Default for SyncState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            stale: false,
            subscribed: false,
        }
    }
}

impl<T> SyncState<T> {
    /// Loaded successfully with nothing in it. Distinct from the error state.
    pub fn is_empty_state(&self) -> bool {
        !self.loading && self.error.is_none() && self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Loaded(usize),
    Subscribed,
    Failed(ApiError),
    /// Torn down or superseded before the result arrived
    Discarded,
}

struct Shared<T: SyncedEntity> {
    state: RwLock<SyncState<T>>,
    scope: RwLock<Option<OwnerScope>>,
    observers: RwLock<Vec<Arc<dyn CollectionObserver<T>>>>,
    order: RwLock<Order>,
    epoch: AtomicU64,
    /// Bumped by every subscribe; only the newest feed task may clear `subscribed`
    feed_generation: AtomicU64,
    alive: AtomicBool,
    revision: watch::Sender<u64>,
}

impl<T: SyncedEntity> Shared<T> {
    fn read(&self) -> RwLockReadGuard<'_, SyncState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SyncState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.alive.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Recompute derived views and bump the revision.
    fn notify(&self) {
        let snapshot = self.read().items.clone();
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_change(&snapshot);
        }
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn order(&self) -> Order {
        self.order.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn merge(&self, apply: impl FnOnce(&mut Vec<T>) -> MergeOutcome) -> MergeOutcome {
        let order = self.order();
        let outcome = {
            let mut state = self.write();
            let outcome = apply(&mut state.items);
            if outcome == MergeOutcome::Inserted {
                place_last(&mut state.items, &order);
            }
            outcome
        };
        if outcome.changed() {
            self.notify();
        }
        outcome
    }

    fn apply_event(&self, event: &ChangeEvent, scope: &OwnerScope) {
        let foreign = event
            .owner(T::OWNER_COLUMN)
            .is_some_and(|owner| owner != scope.as_str());
        if foreign {
            warn!(
                "[EntitySync] Dropping {} event on '{}' for foreign owner",
                event.kind,
                T::TABLE
            );
            return;
        }

        let change = match event.decode::<T>() {
            Ok(change) => change,
            Err(e) => {
                warn!("[EntitySync] Dropping malformed event: {}", e);
                return;
            }
        };

        let kind = change.kind();
        let outcome = self.merge(|items| reconcile::apply_change(items, change));
        debug!(
            "[EntitySync] {} {} on '{}' -> {:?}",
            kind,
            event.record_id().unwrap_or_default(),
            T::TABLE,
            outcome
        );
    }

    /// Replace the collection with a fresh snapshot after a reconnect.
    /// A failed refetch leaves the mirror stale.
    async fn resync(&self, store: &dyn RemoteStore, query: &Query, scope: &OwnerScope) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let result = store.query(query).await;
        if !self.is_current(epoch) {
            debug!("[EntitySync] Discarding '{}' refetch", T::TABLE);
            return;
        }

        match result {
            Ok(rows) => {
                let items = decode_rows::<T>(rows, scope);
                let count = items.len();
                {
                    let mut state = self.write();
                    state.items = items;
                    state.error = None;
                    state.stale = false;
                }
                info!("[EntitySync] Refetched {} rows from '{}'", count, T::TABLE);
                self.notify();
            }
            Err(e) => warn!(
                "[EntitySync] Refetch of '{}' failed, mirror stays stale: {}",
                T::TABLE,
                e
            ),
        }
    }
}

#[derive(Default)]
struct FeedSlot {
    guard: Option<FeedGuard>,
    task: Option<JoinHandle<()>>,
}

impl FeedSlot {
    fn release(&mut self) -> bool {
        let mut released = false;
        if let Some(mut guard) = self.guard.take() {
            guard.release();
            released = true;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        released
    }
}

/// Live mirror of the remote collection backing `T`.
pub struct EntitySync<T: SyncedEntity> {
    store: Arc<dyn RemoteStore>,
    shared: Arc<Shared<T>>,
    limit: Option<usize>,
    feed: Mutex<FeedSlot>,
}

impl<T: SyncedEntity> EntitySync<T> {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            shared: Arc::new(Shared {
                state: RwLock::new(SyncState::default()),
                scope: RwLock::new(None),
                observers: RwLock::new(Vec::new()),
                order: RwLock::new(Order::desc(T::ORDER_COLUMN)),
                epoch: AtomicU64::new(0),
                feed_generation: AtomicU64::new(0),
                alive: AtomicBool::new(true),
                revision,
            }),
            limit: None,
            feed: Mutex::new(FeedSlot::default()),
        }
    }

    pub fn with_order(self, order: Order) -> Self {
        *self
            .shared
            .order
            .write()
            .unwrap_or_else(PoisonError::into_inner) = order;
        self
    }

    fn snapshot_query(&self, scope: &OwnerScope) -> Query {
        let mut query = Query::scoped::<T>(scope).with_order(self.shared.order());
        query.limit = self.limit;
        query
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the owner's rows, replacing the local collection.
    ///
    /// A failed fetch leaves the collection empty with the error flag set.
    /// There is no automatic retry.
    pub async fn initialize(&self, scope: &OwnerScope) -> SyncOutcome {
        if !self.is_alive() {
            return SyncOutcome::Discarded;
        }
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .shared
            .scope
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(scope.clone());
        {
            let mut state = self.shared.write();
            state.loading = true;
            state.error = None;
        }

        let result = self.store.query(&self.snapshot_query(scope)).await;

        if !self.shared.is_current(epoch) {
            debug!(
                "[EntitySync] Discarding '{}' snapshot from epoch {}",
                T::TABLE,
                epoch
            );
            return SyncOutcome::Discarded;
        }

        let outcome = match result {
            Ok(rows) => {
                let items = decode_rows::<T>(rows, scope);
                let count = items.len();
                let mut state = self.shared.write();
                state.items = items;
                state.loading = false;
                state.error = None;
                state.stale = false;
                info!("[EntitySync] Loaded {} rows from '{}'", count, T::TABLE);
                SyncOutcome::Loaded(count)
            }
            Err(e) => {
                error!("[EntitySync] Initial fetch of '{}' failed: {}", T::TABLE, e);
                let mut state = self.shared.write();
                state.items.clear();
                state.loading = false;
                state.error = Some(e.clone());
                SyncOutcome::Failed(e)
            }
        };
        self.shared.notify();
        outcome
    }

    /// Open the owner-scoped change feed and start reconciling it.
    ///
    /// Subscribing again replaces the previous feed.
    pub async fn subscribe(&self, scope: &OwnerScope) -> Result<SyncOutcome> {
        if !self.is_alive() {
            return Ok(SyncOutcome::Discarded);
        }
        let filter = Filter::owner(T::OWNER_COLUMN, scope);
        let feed = self.store.subscribe(T::TABLE, filter).await?;
        if !self.is_alive() {
            // Dropping the feed releases it
            return Ok(SyncOutcome::Discarded);
        }

        let (events, guard) = feed.into_parts();
        let generation = self.shared.feed_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let task = tokio::spawn(run_feed(
            Arc::clone(&self.shared),
            Arc::clone(&self.store),
            self.snapshot_query(scope),
            scope.clone(),
            events,
            generation,
        ));

        let mut slot = self.feed.lock().unwrap_or_else(PoisonError::into_inner);
        slot.release();
        slot.guard = Some(guard);
        slot.task = Some(task);
        self.shared.write().subscribed = true;

        info!("[EntitySync] Subscribed to '{}' for {}", T::TABLE, scope);
        Ok(SyncOutcome::Subscribed)
    }

    /// Release the feed and mark the mirror dead. Safe to call repeatedly.
    pub fn teardown(&self) {
        let was_alive = self.shared.alive.swap(false, Ordering::SeqCst);
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);

        let released = self
            .feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
        {
            let mut state = self.shared.write();
            state.subscribed = false;
            state.loading = false;
        }

        if was_alive {
            info!(
                "[EntitySync] Torn down '{}' (feed released: {})",
                T::TABLE,
                released
            );
        }
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn snapshot(&self) -> SyncState<T> {
        self.shared.read().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.shared.read().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.shared
            .read()
            .items
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Revision counter, bumped after every applied change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// [`changes`](Self::changes) as a stream, for consumers that select over streams.
    pub fn change_stream(&self) -> WatchStream<u64> {
        WatchStream::new(self.changes())
    }

    /// Register a derived view. It is computed immediately, then after every change.
    pub fn add_observer(&self, observer: Arc<dyn CollectionObserver<T>>) {
        observer.on_change(&self.items());
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Scope of the last initialize.
    pub fn scope(&self) -> Result<OwnerScope> {
        self.shared
            .scope
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ApiError::Unauthenticated)
    }

    // =========================================================================
    // Confirmed writes
    // =========================================================================

    /// Merge a row returned by a confirmed remote write.
    pub fn apply_confirmed(&self, item: T) -> MergeOutcome {
        self.shared.merge(|items| reconcile::upsert(items, item))
    }

    pub fn remove_confirmed(&self, id: &str) -> MergeOutcome {
        self.shared.merge(|items| reconcile::remove(items, id))
    }

    /// Insert one row owned by the current scope.
    pub async fn create(&self, draft: Row) -> Result<T> {
        self.create_many(vec![draft])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::store(format!("insert into '{}' returned no row", T::TABLE)))
    }

    /// Insert rows in one call and merge what the store confirmed.
    pub async fn create_many(&self, drafts: Vec<Row>) -> Result<Vec<T>> {
        let scope = self.scope()?;
        let rows = drafts
            .into_iter()
            .map(|mut row| {
                row.insert(
                    T::OWNER_COLUMN.to_string(),
                    serde_json::Value::String(scope.as_str().to_string()),
                );
                row
            })
            .collect();

        let confirmed = self.store.insert(T::TABLE, rows).await?;
        let items = decode_rows::<T>(confirmed, &scope);
        let order = self.shared.order();
        {
            let mut state = self.shared.write();
            for item in &items {
                if reconcile::upsert(&mut state.items, item.clone()) == MergeOutcome::Inserted {
                    place_last(&mut state.items, &order);
                }
            }
        }
        if !items.is_empty() {
            self.shared.notify();
        }
        Ok(items)
    }

    pub async fn update(&self, id: &str, patch: Row) -> Result<T> {
        let scope = self.scope()?;
        let row = self.store.update(T::TABLE, &scope, id, patch).await?;
        let item = T::from_row(row)?;
        self.apply_confirmed(item.clone());
        Ok(item)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let scope = self.scope()?;
        self.store.delete(T::TABLE, &scope, id).await?;
        self.remove_confirmed(id);
        Ok(())
    }
}

impl<T: SyncedEntity> Drop for EntitySync<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<T: SyncedEntity> std::fmt::Debug for EntitySync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.read();
        f.debug_struct("EntitySync")
            .field("table", &T::TABLE)
            .field("items", &state.items.len())
            .field("loading", &state.loading)
            .field("subscribed", &state.subscribed)
            .field("alive", &self.is_alive())
            .finish()
    }
}

async fn run_feed<T: SyncedEntity>(
    shared: Arc<Shared<T>>,
    store: Arc<dyn RemoteStore>,
    query: Query,
    scope: OwnerScope,
    mut events: mpsc::Receiver<FeedEvent>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        if !shared.alive.load(Ordering::SeqCst) {
            break;
        }
        match event {
            FeedEvent::Change(event) => shared.apply_event(&event, &scope),
            FeedEvent::Reconnected => {
                warn!(
                    "[EntitySync] Store reconnected, refetching '{}'",
                    T::TABLE
                );
                shared.write().stale = true;
                shared.revision.send_modify(|revision| *revision += 1);
                shared.resync(store.as_ref(), &query, &scope).await;
            }
        }
    }

    {
        let mut state = shared.write();
        if shared.feed_generation.load(Ordering::SeqCst) == generation {
            state.subscribed = false;
        }
    }
    debug!("[EntitySync] Feed for '{}' ended", T::TABLE);
}

/// Move the last item to its place under `order`, after any equal items.
/// An item that fails to serialize stays at the end.
fn place_last<T: SyncedEntity>(items: &mut [T], order: &Order) {
    let Some((last, rest)) = items.split_last() else {
        return;
    };
    let Ok(row) = last.to_row() else {
        return;
    };
    let index = rest
        .iter()
        .position(|item| {
            item.to_row()
                .is_ok_and(|other| order.compare(&row, &other) == cmp::Ordering::Less)
        })
        .unwrap_or(rest.len());
    items[index..].rotate_right(1);
}

/// Decode snapshot rows, skipping malformed ones and rows for another owner.
fn decode_rows<T: SyncedEntity>(rows: Vec<Row>, scope: &OwnerScope) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match T::from_row(row) {
            Ok(item) if item.owner_id() == scope.as_str() => Some(item),
            Ok(item) => {
                warn!(
                    "[EntitySync] Skipping '{}' row {} for foreign owner",
                    T::TABLE,
                    item.id()
                );
                None
            }
            Err(e) => {
                warn!("[EntitySync] Skipping malformed row: {}", e);
                None
            }
        })
        .collect()
}
