//! Action dispatchers
//!
//! Every user-triggered remote action goes through [`ActionDispatcher::dispatch`]:
//! at most one call per [`ActionKey`] is outstanding, local state is only
//! touched with rows the remote side confirmed, and failures come back to the
//! caller unchanged. The concrete actions are methods on the dispatcher,
//! one module per collaborator.

mod checkout;
mod documents;
mod generation;
mod import;
mod invitations;

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, Instrument};

use coachdeck_api::{ApiError, Result};

/// Identifies an action for the in-flight guard: action name plus target id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub action: String,
    pub target: String,
}

impl ActionKey {
    pub fn new(action: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action, self.target)
    }
}

/// Notified after an action completes successfully.
#[async_trait]
pub trait ActionObserver: Send + Sync {
    /// Action name to observe, or "*" for all
    fn action_filter(&self) -> &str {
        "*"
    }

    async fn on_action_completed(&self, key: &ActionKey);
}

/// Removes its key from the in-flight set when dropped, so the guard is
/// released on success, failure and cancellation alike.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<ActionKey>>>,
    key: ActionKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[derive(Default)]
pub struct ActionDispatcher {
    in_flight: Arc<Mutex<HashSet<ActionKey>>>,
    observers: Vec<Arc<dyn ActionObserver>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observers(observers: Vec<Arc<dyn ActionObserver>>) -> Self {
        Self {
            in_flight: Arc::default(),
            observers,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ActionObserver>) {
        self.observers.push(observer);
    }

    pub fn is_in_flight(&self, key: &ActionKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn acquire(&self, key: &ActionKey) -> Result<InFlightGuard> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return Err(ApiError::AlreadyInFlight {
                key: key.to_string(),
            });
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
        })
    }

    async fn notify_observers(&self, key: &ActionKey) {
        for observer in &self.observers {
            let filter = observer.action_filter();
            if filter == "*" || filter == key.action {
                observer.on_action_completed(key).await;
            }
        }
    }

    /// Run `action` under the in-flight guard for `key`.
    ///
    /// A second dispatch for the same key while the first is outstanding
    /// fails with [`ApiError::AlreadyInFlight`] without polling its future.
    pub async fn dispatch<R, F>(&self, key: ActionKey, action: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        let _guard = match self.acquire(&key) {
            Ok(guard) => guard,
            Err(e) => {
                info!("[ActionDispatcher] Rejected {}: already in flight", key);
                return Err(e);
            }
        };

        let span = tracing::span!(
            tracing::Level::INFO,
            "dispatcher.dispatch",
            "action.name" = %key.action,
            "action.target" = %key.target
        );

        async {
            info!("[ActionDispatcher] Dispatching {}", key);
            match action.await {
                Ok(result) => {
                    info!("[ActionDispatcher] {} succeeded", key);
                    self.notify_observers(&key).await;
                    Ok(result)
                }
                Err(e) => {
                    error!("[ActionDispatcher] {} failed: {}", key, e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("in_flight", &self.in_flight.lock().map(|s| s.len()).unwrap_or(0))
            .field("observers", &self.observers.len())
            .finish()
    }
}
