use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use coachdeck_api::{BuddyMessage, Task};

use super::rate;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSummary {
    pub open: usize,
    pub completed: usize,
    /// Open tasks whose due date has passed
    pub overdue: usize,
    pub completion_rate: f64,
}

impl TaskSummary {
    pub fn at(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let completed = tasks.iter().filter(|t| t.completed).count();
        let overdue = tasks
            .iter()
            .filter(|t| !t.completed && t.due_date.is_some_and(|due| due < now))
            .count();
        Self {
            open: tasks.len() - completed,
            completed,
            overdue,
            completion_rate: rate(completed as u64, tasks.len() as u64),
        }
    }
}

/// Unread messages per buddy pair, excluding the reader's own messages.
pub fn unread_by_pair(messages: &[BuddyMessage], reader_id: &str) -> BTreeMap<String, usize> {
    let mut unread = BTreeMap::new();
    for message in messages {
        if !message.read && message.sender_id != reader_id {
            *unread.entry(message.pair_id.clone()).or_insert(0) += 1;
        }
    }
    unread
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(id: &str, completed: bool, due_in_days: Option<i64>) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            user_id: "u1".to_string(),
            title: format!("task {id}"),
            notes: None,
            completed,
            priority: 1,
            due_date: due_in_days.map(|d| now + Duration::days(d)),
            created_at: now,
            updated_at: now,
        }
    }

    fn message(pair: &str, sender: &str, read: bool) -> BuddyMessage {
        BuddyMessage {
            id: format!("{pair}-{sender}-{read}"),
            user_id: "u1".to_string(),
            pair_id: pair.to_string(),
            sender_id: sender.to_string(),
            body: "hi".to_string(),
            read,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_summary() {
        let summary = TaskSummary::at(
            &[
                task("1", true, Some(-3)),
                task("2", false, Some(-1)),
                task("3", false, Some(2)),
                task("4", false, None),
            ],
            Utc::now(),
        );
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.open, 3);
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.completion_rate, 0.25);
    }

    #[test]
    fn test_empty_task_summary() {
        assert_eq!(TaskSummary::at(&[], Utc::now()), TaskSummary::default());
    }

    #[test]
    fn test_unread_by_pair_skips_own_messages() {
        let unread = unread_by_pair(
            &[
                message("p1", "buddy", false),
                message("p1", "me", false),
                message("p1", "buddy", true),
                message("p2", "other", false),
            ],
            "me",
        );
        assert_eq!(unread.get("p1"), Some(&1));
        assert_eq!(unread.get("p2"), Some(&1));
    }
}
