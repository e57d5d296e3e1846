//! Subscription lifecycle
//!
//! The billing webhook is the only source allowed to grant access. Events
//! the client produces (e.g. after returning from checkout) can never move
//! the lifecycle into `trialing` or `active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use coachdeck_api::{ApiError, BillingStatus, Result, Subscription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BillingState {
    #[default]
    None,
    Trialing,
    Active,
    PastDue {
        grace_period_end: Option<DateTime<Utc>>,
    },
    /// Terminal. Re-subscribing starts a new lifecycle.
    Canceled,
}

impl BillingState {
    pub fn status(&self) -> BillingStatus {
        match self {
            BillingState::None => BillingStatus::None,
            BillingState::Trialing => BillingStatus::Trialing,
            BillingState::Active => BillingStatus::Active,
            BillingState::PastDue { .. } => BillingStatus::PastDue,
            BillingState::Canceled => BillingStatus::Canceled,
        }
    }

    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        let grace_period_end = match self {
            BillingState::PastDue { grace_period_end } => *grace_period_end,
            _ => None,
        };
        self.status().grants_access(grace_period_end, now)
    }
}

impl fmt::Display for BillingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.status(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Webhook,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingEventKind {
    TrialStarted,
    PaymentSucceeded,
    PaymentFailed {
        grace_period_end: Option<DateTime<Utc>>,
    },
    Canceled,
}

impl fmt::Display for BillingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BillingEventKind::TrialStarted => "trial_started",
            BillingEventKind::PaymentSucceeded => "payment_succeeded",
            BillingEventKind::PaymentFailed { .. } => "payment_failed",
            BillingEventKind::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub kind: BillingEventKind,
    pub source: EventSource,
}

impl BillingEvent {
    pub fn from_webhook(kind: BillingEventKind) -> Self {
        Self {
            kind,
            source: EventSource::Webhook,
        }
    }

    pub fn from_client(kind: BillingEventKind) -> Self {
        Self {
            kind,
            source: EventSource::Client,
        }
    }
}

/// Next state for `event` from `state`, or `None` if the transition is not allowed.
fn transition(state: BillingState, event: &BillingEvent) -> Option<BillingState> {
    use BillingEventKind as E;
    use BillingState as S;

    let next = match (state, event.kind) {
        (S::Canceled, _) => return None,
        (S::None, E::TrialStarted) => S::Trialing,
        (S::None | S::Trialing | S::PastDue { .. }, E::PaymentSucceeded) => S::Active,
        (S::Trialing | S::Active | S::PastDue { .. }, E::PaymentFailed { grace_period_end }) => {
            S::PastDue { grace_period_end }
        }
        (S::Trialing | S::Active | S::PastDue { .. }, E::Canceled) => S::Canceled,
        _ => return None,
    };

    if event.source != EventSource::Webhook && !narrows_access(state, next) {
        return None;
    }
    Some(next)
}

/// Whether moving from `state` to `next` can only shorten access. Events
/// from sources other than the webhook are limited to these.
fn narrows_access(state: BillingState, next: BillingState) -> bool {
    use BillingState as S;

    match (state, next) {
        (_, S::Active | S::Trialing) => false,
        (S::PastDue { grace_period_end: old }, S::PastDue { grace_period_end: new }) => {
            match (old, new) {
                (_, None) => true,
                (Some(old), Some(new)) => new <= old,
                (None, Some(_)) => false,
            }
        }
        _ => true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingLifecycle {
    state: BillingState,
}

impl BillingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a stored subscription row.
    pub fn from_subscription(subscription: &Subscription) -> Self {
        let state = match subscription.status {
            BillingStatus::None => BillingState::None,
            BillingStatus::Trialing => BillingState::Trialing,
            BillingStatus::Active => BillingState::Active,
            BillingStatus::PastDue => BillingState::PastDue {
                grace_period_end: subscription.grace_period_end,
            },
            BillingStatus::Canceled => BillingState::Canceled,
        };
        Self { state }
    }

    pub fn state(&self) -> BillingState {
        self.state
    }

    pub fn status(&self) -> BillingStatus {
        self.state.status()
    }

    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.state.is_entitled(now)
    }

    /// Apply an event. A rejected event leaves the state unchanged.
    pub fn apply(&mut self, event: BillingEvent) -> Result<BillingState> {
        match transition(self.state, &event) {
            Some(next) => {
                info!(
                    "[Billing] {} -> {} on {} ({:?})",
                    self.state, next, event.kind, event.source
                );
                self.state = next;
                Ok(next)
            }
            None => {
                warn!(
                    "[Billing] Rejected {} from {:?} in state {}",
                    event.kind, event.source, self.state
                );
                Err(ApiError::InvalidTransition {
                    from: self.state.to_string(),
                    event: event.kind.to_string(),
                })
            }
        }
    }
}

/// The subscription that decides entitlement: the most recently updated row.
pub fn latest_subscription(subscriptions: &[Subscription]) -> Option<&Subscription> {
    subscriptions.iter().max_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then_with(|| b.id.cmp(&a.id))
    })
}

pub fn is_entitled(subscriptions: &[Subscription], now: DateTime<Utc>) -> bool {
    latest_subscription(subscriptions).is_some_and(|s| s.is_entitled(now))
}
