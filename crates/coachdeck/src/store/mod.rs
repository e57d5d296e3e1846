//! Remote store contract
//!
//! The hosted backend is an external collaborator. Everything the sync layer
//! needs from it fits in [`RemoteStore`]: owner-scoped queries, row writes
//! that return the confirmed row, and change feeds delivered over a channel.

pub mod memory;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use std::cmp::Ordering;

use coachdeck_api::{ApiError, ChangeFeed, OwnerScope, Result, Row, SyncedEntity};

pub use memory::{MemoryStore, StoreOp};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    IsNull(String),
    IsNotNull(String),
}

impl Filter {
    /// The tenant-isolation filter: `owner_column = scope`.
    pub fn owner(owner_column: &str, scope: &OwnerScope) -> Self {
        Filter::Eq(owner_column.to_string(), Value::String(scope.as_str().to_string()))
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Evaluate against a row. Missing columns compare as null.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(column).is_some_and(|v| v == value),
            Filter::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Filter::IsNull(column) => row.get(column).is_none_or(Value::is_null),
            Filter::IsNotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }

    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    /// Compare two rows by this ordering. Nulls sort last in either direction.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get(&self.column).filter(|v| !v.is_null());
        let right = b.get(&self.column).filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                if self.descending { ord.reverse() } else { ord }
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => {
            // Timestamps may differ in fractional digits, so compare them as instants
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// A scoped read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filter: Filter,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Owner-scoped query for entity `T`, newest first by its order column.
    pub fn scoped<T: SyncedEntity>(scope: &OwnerScope) -> Self {
        Self {
            table: T::TABLE.to_string(),
            filter: Filter::owner(T::OWNER_COLUMN, scope),
            order: Some(Order::desc(T::ORDER_COLUMN)),
            limit: None,
        }
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn and_filter(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }
}

/// Row CRUD, scoped queries and change subscriptions against the hosted backend.
///
/// Writes return the row as the store committed it; callers merge that row
/// locally, never their own copy.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn query(&self, query: &Query) -> Result<Vec<Row>>;

    /// Single-row lookup. `Ok(None)` is "no matching row"; `Err` is a real failure.
    async fn fetch_one(&self, table: &str, filter: &Filter) -> Result<Option<Row>> {
        let query = Query {
            table: table.to_string(),
            filter: filter.clone(),
            order: None,
            limit: Some(1),
        };
        Ok(self.query(&query).await?.into_iter().next())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>>;

    /// Patch the owner's row `id`. Fails with [`ApiError::NotFound`] if absent.
    async fn update(&self, table: &str, scope: &OwnerScope, id: &str, patch: Row) -> Result<Row>;

    /// Delete the owner's row `id`. Fails with [`ApiError::NotFound`] if absent.
    async fn delete(&self, table: &str, scope: &OwnerScope, id: &str) -> Result<()>;

    /// Open a change feed for rows of `table` matching `filter`.
    async fn subscribe(&self, table: &str, filter: Filter) -> Result<ChangeFeed>;
}

/// Read the `id` column of a row as a string.
pub fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn not_found(table: &str, id: &str) -> ApiError {
    ApiError::NotFound {
        table: table.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matching() {
        let r = row(json!({"id": "1", "user_id": "u1", "tags": null, "points": 4}));
        assert!(Filter::eq("user_id", "u1").matches(&r));
        assert!(!Filter::eq("user_id", "u2").matches(&r));
        assert!(Filter::IsNull("tags".to_string()).matches(&r));
        assert!(Filter::IsNull("missing".to_string()).matches(&r));
        assert!(Filter::IsNotNull("points".to_string()).matches(&r));
        assert!(Filter::In("id".to_string(), vec![json!("0"), json!("1")]).matches(&r));
        assert!(
            Filter::eq("user_id", "u1")
                .and(Filter::eq("points", 4))
                .matches(&r)
        );
        assert!(
            Filter::Or(vec![Filter::eq("user_id", "x"), Filter::eq("id", "1")]).matches(&r)
        );
    }

    #[test]
    fn test_order_puts_nulls_last() {
        let a = row(json!({"created_at": "2026-01-02T00:00:00Z"}));
        let b = row(json!({"created_at": "2026-01-01T00:00:00Z"}));
        let c = row(json!({"created_at": null}));

        let mut rows = vec![c.clone(), b.clone(), a.clone()];
        let order = Order::desc("created_at");
        rows.sort_by(|x, y| order.compare(x, y));
        assert_eq!(rows, vec![a.clone(), b.clone(), c.clone()]);

        let order = Order::asc("created_at");
        rows.sort_by(|x, y| order.compare(x, y));
        assert_eq!(rows, vec![b, a, c]);
    }

    #[test]
    fn test_order_compares_timestamps_as_instants() {
        let whole = row(json!({"created_at": "2026-01-01T09:00:00Z"}));
        let fractional = row(json!({"created_at": "2026-01-01T09:00:00.5Z"}));
        let offset = row(json!({"created_at": "2026-01-01T10:00:00+02:00"}));

        let order = Order::asc("created_at");
        assert_eq!(order.compare(&whole, &fractional), Ordering::Less);
        assert_eq!(order.compare(&offset, &whole), Ordering::Less);
        assert_eq!(
            order.compare(&row(json!({"created_at": "b"})), &row(json!({"created_at": "a"}))),
            Ordering::Greater
        );
    }

    #[test]
    fn test_scoped_query_filters_by_owner() {
        let scope = OwnerScope::new("coach-1").unwrap();
        let query = Query::scoped::<coachdeck_api::Task>(&scope).with_limit(50);
        assert_eq!(query.table, "tasks");
        assert_eq!(query.filter, Filter::eq("user_id", "coach-1"));
        assert_eq!(query.order, Some(Order::desc("created_at")));
        assert_eq!(query.limit, Some(50));
    }
}
