//! Polling change feed
//!
//! Re-reads the subscribed rows on an interval and turns the difference
//! between consecutive snapshots into change events. The first successful
//! poll, and the first one after a failure, emit `Reconnected` so mirrors
//! refetch whatever changed while nobody was watching.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use coachdeck::store::row_id;
use coachdeck_api::{ChangeEvent, ChangeFeed, FeedEvent, Result, Row};

pub const FEED_CAPACITY: usize = 256;

/// Events turning `previous` into `current`: inserts and updates in
/// `current` order, then deletes ordered by id. Rows without an id are
/// ignored.
pub fn diff_snapshots(
    table: &str,
    previous: &HashMap<String, Row>,
    current: &[Row],
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut seen = Vec::with_capacity(current.len());

    for row in current {
        let Some(id) = row_id(row) else {
            continue;
        };
        match previous.get(&id) {
            None => events.push(ChangeEvent::insert(table, row.clone())),
            Some(old) if old != row => events.push(ChangeEvent::update(table, row.clone())),
            Some(_) => {}
        }
        seen.push(id);
    }

    let mut gone: Vec<(&String, &Row)> = previous
        .iter()
        .filter(|(id, _)| !seen.contains(id))
        .collect();
    gone.sort_by(|a, b| a.0.cmp(b.0));
    events.extend(
        gone.into_iter()
            .map(|(_, row)| ChangeEvent::delete(table, row.clone())),
    );

    events
}

fn index(rows: Vec<Row>) -> HashMap<String, Row> {
    rows.into_iter()
        .filter_map(|row| row_id(&row).map(|id| (id, row)))
        .collect()
}

/// Start polling `fetch` every `interval`. The first successful fetch is the
/// baseline: it produces no change events, only `Reconnected`.
pub fn spawn_poller<F, Fut>(table: String, interval: Duration, fetch: F) -> ChangeFeed
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<Row>>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();

    tokio::spawn(async move {
        let mut snapshot: Option<HashMap<String, Row>> = None;
        let mut failing = false;
        info!("[PollingFeed] Started feed for {} every {:?}", table, interval);

        loop {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }

            match fetch().await {
                Ok(rows) => {
                    let events = match &snapshot {
                        Some(previous) => diff_snapshots(&table, previous, &rows),
                        None => Vec::new(),
                    };
                    if failing || snapshot.is_none() {
                        if failing {
                            info!("[PollingFeed] {} feed recovered", table);
                        } else {
                            debug!("[PollingFeed] {} baseline of {} rows", table, rows.len());
                        }
                        failing = false;
                        if tx.send(FeedEvent::Reconnected).await.is_err() {
                            break;
                        }
                    }
                    if !events.is_empty() {
                        debug!("[PollingFeed] {} change(s) on {}", events.len(), table);
                    }
                    let mut open = true;
                    for event in events {
                        if tx.send(FeedEvent::Change(event)).await.is_err() {
                            open = false;
                            break;
                        }
                    }
                    if !open {
                        break;
                    }
                    snapshot = Some(index(rows));
                }
                Err(e) => {
                    if !failing {
                        warn!("[PollingFeed] Poll of {} failed: {}", table, e);
                    }
                    failing = true;
                }
            }

            tokio::select! {
                _ = tx.closed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("[PollingFeed] Stopped feed for {}", table);
    });

    ChangeFeed::new(rx, move || flag.store(true, Ordering::SeqCst))
}
