//! Derived state computed from mirrored collections.
//!
//! Views are plain functions of a slice. [`DerivedView`] wraps one as an
//! observer so it recomputes synchronously whenever its [`EntitySync`]
//! applies a change.
//!
//! [`EntitySync`]: crate::core::EntitySync

pub mod engagement;
pub mod leaderboard;
pub mod tasks;

use std::sync::{PoisonError, RwLock};

pub use engagement::{CampaignEngagement, EngagementSummary, campaign_ranking};
pub use leaderboard::{LeaderboardEntry, leaderboard, rank_by};
pub use tasks::{TaskSummary, unread_by_pair};

/// Notified with the full collection after every applied change.
pub trait CollectionObserver<T>: Send + Sync {
    fn on_change(&self, items: &[T]);
}

/// A cached value recomputed from a collection on every change.
pub struct DerivedView<T, R> {
    compute: Box<dyn Fn(&[T]) -> R + Send + Sync>,
    value: RwLock<R>,
}

impl<T, R: Default> DerivedView<T, R> {
    pub fn new(compute: impl Fn(&[T]) -> R + Send + Sync + 'static) -> Self {
        Self {
            compute: Box::new(compute),
            value: RwLock::new(R::default()),
        }
    }
}

impl<T, R: Clone> DerivedView<T, R> {
    pub fn get(&self) -> R {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T, R> CollectionObserver<T> for DerivedView<T, R>
where
    T: Send + Sync,
    R: Send + Sync,
{
    fn on_change(&self, items: &[T]) {
        let next = (self.compute)(items);
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}
