//! Row builders shaped like the hosted tables.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use coachdeck_api::Row;

fn object(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub fn client_row(id: &str, owner: &str, email: &str) -> Row {
    let now = Utc::now();
    object(json!({
        "id": id,
        "user_id": owner,
        "email": email,
        "name": null,
        "phone": null,
        "tags": [],
        "invited_at": null,
        "created_at": stamp(now),
        "updated_at": stamp(now),
    }))
}

pub fn task_row(id: &str, owner: &str, title: &str) -> Row {
    task_row_at(id, owner, title, Utc::now())
}

pub fn task_row_at(id: &str, owner: &str, title: &str, updated_at: DateTime<Utc>) -> Row {
    object(json!({
        "id": id,
        "user_id": owner,
        "title": title,
        "notes": null,
        "completed": false,
        "priority": 1,
        "due_date": null,
        "created_at": stamp(updated_at - Duration::hours(1)),
        "updated_at": stamp(updated_at),
    }))
}

pub fn member_row(id: &str, owner: &str, name: &str, points: i64, streak_days: u32) -> Row {
    let now = Utc::now();
    object(json!({
        "id": id,
        "user_id": owner,
        "display_name": name,
        "points": points,
        "streak_days": streak_days,
        "checkins_completed": 0,
        "created_at": stamp(now),
        "updated_at": stamp(now),
    }))
}

pub fn metric_row(id: &str, owner: &str, campaign: &str, sent: u64, opened: u64) -> Row {
    let now = Utc::now();
    object(json!({
        "id": id,
        "user_id": owner,
        "campaign_id": campaign,
        "campaign_name": null,
        "sent": sent,
        "delivered": sent,
        "opened": opened,
        "clicked": 0,
        "bounced": 0,
        "unsubscribed": 0,
        "created_at": stamp(now),
        "updated_at": stamp(now),
    }))
}

pub fn subscription_row(
    id: &str,
    owner: &str,
    status: &str,
    grace_period_end: Option<DateTime<Utc>>,
) -> Row {
    let now = Utc::now();
    object(json!({
        "id": id,
        "user_id": owner,
        "tier": "pro",
        "status": status,
        "grace_period_end": grace_period_end.map(stamp),
        "current_period_end": null,
        "customer_ref": null,
        "created_at": stamp(now),
        "updated_at": stamp(now),
    }))
}

pub fn workflow_row(id: &str, owner: &str, name: &str) -> Row {
    let now = Utc::now();
    object(json!({
        "id": id,
        "user_id": owner,
        "name": name,
        "nodes": [],
        "created_at": stamp(now),
        "updated_at": stamp(now),
    }))
}
