//! Dashboard entities mirrored from the hosted backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::SyncedEntity;
use crate::payload::NodeConfig;

macro_rules! synced_entity {
    ($ty:ty, $table:literal) => {
        impl SyncedEntity for $ty {
            const TABLE: &'static str = $table;

            fn id(&self) -> &str {
                &self.id
            }

            fn owner_id(&self) -> &str {
                &self.user_id
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        }
    };
}

// =============================================================================
// Billing
// =============================================================================

/// Billing status as stored on the `subscriptions` row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    #[default]
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl BillingStatus {
    /// Whether this status grants feature access at `now`.
    ///
    /// `past_due` stays entitled until its grace period ends; without a grace
    /// period end it is not entitled.
    pub fn grants_access(&self, grace_period_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match self {
            BillingStatus::Active | BillingStatus::Trialing => true,
            BillingStatus::PastDue => grace_period_end.is_some_and(|end| end > now),
            BillingStatus::None | BillingStatus::Canceled => false,
        }
    }
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BillingStatus::None => "none",
            BillingStatus::Trialing => "trialing",
            BillingStatus::Active => "active",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub tier: String,
    #[serde(default)]
    pub status: BillingStatus,
    pub grace_period_end: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    /// Payment provider's customer id
    pub customer_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.status.grants_access(self.grace_period_end, now)
    }
}

synced_entity!(Subscription, "subscriptions");

// =============================================================================
// Email engagement
// =============================================================================

/// Per-campaign delivery counters written by the email provider's webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMetric {
    pub id: String,
    pub user_id: String,
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub opened: u64,
    #[serde(default)]
    pub clicked: u64,
    #[serde(default)]
    pub bounced: u64,
    #[serde(default)]
    pub unsubscribed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

synced_entity!(EmailMetric, "email_metrics");

// =============================================================================
// Accountability & buddies
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountabilityMember {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub checkins_completed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountabilityMember {
    /// Leaderboard score: points, streaks weighted double, plus check-ins.
    pub fn score(&self) -> i64 {
        self.points
            .saturating_add(2 * i64::from(self.streak_days))
            .saturating_add(i64::from(self.checkins_completed))
    }
}

synced_entity!(AccountabilityMember, "accountability_members");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuddyMessage {
    pub id: String,
    pub user_id: String,
    pub pair_id: String,
    pub sender_id: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

synced_entity!(BuddyMessage, "buddy_messages");

// =============================================================================
// Tasks & clients
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_priority() -> i32 {
    1
}

synced_entity!(Task, "tasks");

/// A coaching client (contact) owned by the coach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub invited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

synced_entity!(Client, "clients");

// =============================================================================
// Workflows
// =============================================================================

/// An email workflow: an ordered chain of typed nodes persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

synced_entity!(Workflow, "workflows");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    pub label: Option<String>,
    pub config: NodeConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_grace_period_entitlement() {
        let now = Utc::now();
        let tomorrow = now + Duration::days(1);
        let yesterday = now - Duration::days(1);

        assert!(BillingStatus::PastDue.grants_access(Some(tomorrow), now));
        assert!(!BillingStatus::PastDue.grants_access(Some(yesterday), now));
        assert!(!BillingStatus::PastDue.grants_access(None, now));
        assert!(BillingStatus::Active.grants_access(None, now));
        assert!(BillingStatus::Trialing.grants_access(Some(yesterday), now));
        assert!(!BillingStatus::Canceled.grants_access(Some(tomorrow), now));
        assert!(!BillingStatus::None.grants_access(None, now));
    }

    #[test]
    fn test_member_score() {
        let member = AccountabilityMember {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            display_name: "Ada".to_string(),
            points: 10,
            streak_days: 3,
            checkins_completed: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(member.score(), 20);
    }

    #[test]
    fn test_row_roundtrip_keeps_table_contract() {
        let json = serde_json::json!({
            "id": "c1",
            "user_id": "u1",
            "email": "ada@example.com",
            "created_at": "2026-03-01T09:00:00Z",
            "updated_at": "2026-03-01T09:00:00Z"
        });
        let client = Client::from_row(json.as_object().cloned().unwrap()).unwrap();
        assert!(client.tags.is_empty());
        assert_eq!(client.owner_id(), "u1");
        assert_eq!(Client::TABLE, "clients");
        assert_eq!(Client::OWNER_COLUMN, "user_id");

        let row = client.to_row().unwrap();
        assert_eq!(row.get("email").and_then(|v| v.as_str()), Some("ada@example.com"));
    }
}
