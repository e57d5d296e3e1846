//! Filter to PostgREST query-string translation.

use serde_json::Value;

use coachdeck::store::{Filter, Order};

/// Top-level query pairs for `filter`. A top-level `And` flattens into one
/// pair per conjunct, which PostgREST combines with AND.
pub fn to_query_pairs(filter: &Filter) -> Vec<(String, String)> {
    match filter {
        Filter::And(filters) => filters.iter().flat_map(to_query_pairs).collect(),
        Filter::Eq(column, value) => vec![(column.clone(), format!("eq.{}", plain(value)))],
        Filter::In(column, values) => vec![(column.clone(), format!("in.({})", list(values)))],
        Filter::IsNull(column) => vec![(column.clone(), "is.null".to_string())],
        Filter::IsNotNull(column) => vec![(column.clone(), "not.is.null".to_string())],
        Filter::Or(filters) => vec![("or".to_string(), format!("({})", inline_list(filters)))],
    }
}

/// Inline form used inside `or=(...)` and `and(...)` groups.
fn inline(filter: &Filter) -> String {
    match filter {
        Filter::Eq(column, value) => format!("{}.eq.{}", column, quoted(value)),
        Filter::In(column, values) => format!("{}.in.({})", column, list(values)),
        Filter::IsNull(column) => format!("{}.is.null", column),
        Filter::IsNotNull(column) => format!("{}.not.is.null", column),
        Filter::And(filters) => format!("and({})", inline_list(filters)),
        Filter::Or(filters) => format!("or({})", inline_list(filters)),
    }
}

fn inline_list(filters: &[Filter]) -> String {
    filters.iter().map(inline).collect::<Vec<_>>().join(",")
}

fn list(values: &[Value]) -> String {
    values.iter().map(quoted).collect::<Vec<_>>().join(",")
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Values inside grouped expressions need quoting when they contain
/// PostgREST's reserved characters.
fn quoted(value: &Value) -> String {
    let text = plain(value);
    if text.contains([',', '.', ':', '(', ')', '"', ' ']) {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

pub fn order_param(order: &Order) -> String {
    let direction = if order.descending { "desc" } else { "asc" };
    format!("{}.{}.nullslast", order.column, direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(column: &str, value: &str) -> (String, String) {
        (column.to_string(), value.to_string())
    }

    #[test]
    fn test_owner_scope_and_equality() {
        let filter = Filter::eq("user_id", "u-1").and(Filter::eq("priority", 3));
        assert_eq!(
            to_query_pairs(&filter),
            vec![pair("user_id", "eq.u-1"), pair("priority", "eq.3")]
        );
    }

    #[test]
    fn test_null_checks_and_in() {
        assert_eq!(
            to_query_pairs(&Filter::IsNull("invited_at".to_string())),
            vec![pair("invited_at", "is.null")]
        );
        assert_eq!(
            to_query_pairs(&Filter::IsNotNull("invited_at".to_string())),
            vec![pair("invited_at", "not.is.null")]
        );
        assert_eq!(
            to_query_pairs(&Filter::In("status".to_string(), vec![json!("active"), json!("past_due")])),
            vec![pair("status", "in.(active,past_due)")]
        );
    }

    #[test]
    fn test_or_with_nested_and_quotes_reserved_values() {
        let filter = Filter::Or(vec![
            Filter::eq("email", "ada@example.com"),
            Filter::And(vec![
                Filter::eq("name", "Ada, L."),
                Filter::IsNull("phone".to_string()),
            ]),
        ]);
        assert_eq!(
            to_query_pairs(&filter),
            vec![pair(
                "or",
                "(email.eq.\"ada@example.com\",and(name.eq.\"Ada, L.\",phone.is.null))"
            )]
        );
    }

    #[test]
    fn test_order_param_puts_nulls_last() {
        assert_eq!(order_param(&Order::desc("created_at")), "created_at.desc.nullslast");
        assert_eq!(order_param(&Order::asc("due_date")), "due_date.asc.nullslast");
    }
}
