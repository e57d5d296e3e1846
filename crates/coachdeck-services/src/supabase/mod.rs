//! Hosted backend client
//!
//! [`SupabaseStore`] implements [`RemoteStore`] over the backend's PostgREST
//! endpoint. Writes ask for `return=representation` so the committed row
//! comes back in the response. Change feeds poll the subscribed rows.

pub mod feed;
pub mod filters;

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use coachdeck::AppConfig;
use coachdeck::store::{Filter, Query, RemoteStore};
use coachdeck_api::{ApiError, ChangeFeed, OwnerScope, Result, Row};

use crate::http::{self, Upstream};

const OWNER_COLUMN: &str = "user_id";
const RETURN_REPRESENTATION: &str = "return=representation";

struct Inner {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

/// PostgREST-backed [`RemoteStore`].
#[derive(Clone)]
pub struct SupabaseStore {
    inner: Arc<Inner>,
    poll_interval: Duration,
}

impl SupabaseStore {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                client: http::build_client()?,
                base_url: base_url.trim_end_matches('/').to_string(),
                anon_key: anon_key.to_string(),
                access_token: RwLock::new(None),
            }),
            poll_interval: Duration::from_secs(2),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let url = config
            .backend
            .url
            .as_deref()
            .ok_or_else(|| ApiError::invalid_input("backend.url is not configured"))?;
        let anon_key = config
            .backend
            .anon_key
            .as_deref()
            .ok_or_else(|| ApiError::invalid_input("backend.anon_key is not configured"))?;

        let store = Self::new(url, anon_key)?;
        Ok(store.with_poll_interval(config.poll_interval()))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Send requests as the signed-in user. `None` falls back to the anon key.
    pub fn set_access_token(&self, token: Option<String>) {
        *self
            .inner
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.inner.base_url, table)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let bearer = self.inner.token().unwrap_or_else(|| self.inner.anon_key.clone());
        self.inner
            .client
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
    }

    async fn fetch_rows(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<Vec<Row>> {
        let body = http::send(request, url, operation, Upstream::Store).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        http::parse_json(&body, url, Upstream::Store)
    }
}

impl Inner {
    fn token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Query-string for a read: projection, filters, order, limit.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filters::to_query_pairs(&query.filter));
    if let Some(order) = &query.order {
        params.push(("order".to_string(), filters::order_param(order)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn row_params(scope: &OwnerScope, id: &str) -> Vec<(String, String)> {
    filters::to_query_pairs(&Filter::eq("id", id).and(Filter::owner(OWNER_COLUMN, scope)))
}

fn not_found(table: &str, id: &str) -> ApiError {
    ApiError::NotFound {
        table: table.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    #[tracing::instrument(name = "store.supabase.query", skip(self, query), fields(table = %query.table))]
    async fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let url = self.table_url(&query.table);
        let request = self
            .request(reqwest::Method::GET, &url)
            .query(&query_params(query));
        let rows = self.fetch_rows(request, &url, "query rows").await?;
        debug!("[SupabaseStore] {} row(s) from {}", rows.len(), query.table);
        Ok(rows)
    }

    #[tracing::instrument(name = "store.supabase.insert", skip(self, rows), fields(count = rows.len()))]
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let url = self.table_url(table);
        let request = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&rows);
        let confirmed = self.fetch_rows(request, &url, "insert rows").await?;
        info!("[SupabaseStore] Inserted {} row(s) into {}", confirmed.len(), table);
        Ok(confirmed)
    }

    #[tracing::instrument(name = "store.supabase.update", skip(self, scope, patch))]
    async fn update(&self, table: &str, scope: &OwnerScope, id: &str, patch: Row) -> Result<Row> {
        let url = self.table_url(table);
        let request = self
            .request(reqwest::Method::PATCH, &url)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&row_params(scope, id))
            .json(&patch);
        self.fetch_rows(request, &url, "update row")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(table, id))
    }

    #[tracing::instrument(name = "store.supabase.delete", skip(self, scope))]
    async fn delete(&self, table: &str, scope: &OwnerScope, id: &str) -> Result<()> {
        let url = self.table_url(table);
        let request = self
            .request(reqwest::Method::DELETE, &url)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&row_params(scope, id));
        let removed = self.fetch_rows(request, &url, "delete row").await?;
        if removed.is_empty() {
            return Err(not_found(table, id));
        }
        Ok(())
    }

    async fn subscribe(&self, table: &str, filter: Filter) -> Result<ChangeFeed> {
        let query = Query {
            table: table.to_string(),
            filter,
            order: None,
            limit: None,
        };
        let store = self.clone();
        let fetch = move || {
            let store = store.clone();
            let query = query.clone();
            async move { store.query(&query).await }
        };
        Ok(feed::spawn_poller(
            table.to_string(),
            self.poll_interval,
            fetch,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachdeck::store::Order;

    #[test]
    fn test_query_params_for_scoped_read() {
        let scope = OwnerScope::new("coach-1").unwrap();
        let query = Query::scoped::<coachdeck_api::Task>(&scope)
            .with_order(Order::asc("due_date"))
            .with_limit(50);

        let params = query_params(&query);
        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert!(params.contains(&("user_id".to_string(), "eq.coach-1".to_string())));
        assert!(params.contains(&("order".to_string(), "due_date.asc.nullslast".to_string())));
        assert!(params.contains(&("limit".to_string(), "50".to_string())));
    }

    #[test]
    fn test_row_writes_are_owner_scoped() {
        let scope = OwnerScope::new("coach-1").unwrap();
        assert_eq!(
            row_params(&scope, "c9"),
            vec![
                ("id".to_string(), "eq.c9".to_string()),
                ("user_id".to_string(), "eq.coach-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_config_requires_backend() {
        let config = AppConfig::default();
        assert!(matches!(
            SupabaseStore::from_config(&config),
            Err(ApiError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_urls_drop_trailing_slash() {
        let store = SupabaseStore::new("https://demo.supabase.co/", "anon").unwrap();
        assert_eq!(store.table_url("tasks"), "https://demo.supabase.co/rest/v1/tasks");
    }
}
