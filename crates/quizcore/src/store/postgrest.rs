//! Minimal PostgREST client (the REST layer of a hosted Supabase project).
//!
//! Exposes the table operations the quiz needs (`count`, `select`,
//! `insert`, `update`, `upsert`) over a small `Query` builder that renders
//! PostgREST's horizontal filter syntax (`col=eq.value`, `col=not.in.(1,2)`).

use crate::error::{AppError, AppResult};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Timeouts and pool bounds for the underlying HTTP client.
#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            max_idle_per_host: 8,
        }
    }
}

/// Build a reqwest client honoring `limits`.
pub fn build_http_client(limits: HttpLimits) -> AppResult<Client> {
    Ok(Client::builder()
        .connect_timeout(limits.connect_timeout)
        .timeout(limits.request_timeout)
        .pool_max_idle_per_host(limits.max_idle_per_host)
        .build()?)
}

/// A read/filter description for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    columns: String,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl Query {
    /// Start a query against `table` projecting every column.
    pub fn table(name: &str) -> Self {
        Self {
            table: name.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// `IS` filter, for `true`, `false` and `null`.
    #[must_use]
    pub fn is(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), format!("is.{value}")));
        self
    }

    /// Set-difference filter. An empty set adds no filter at all.
    #[must_use]
    pub fn not_in(mut self, column: &str, values: &[i64]) -> Self {
        if !values.is_empty() {
            let list = values.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
            self.filters.push((column.to_string(), format!("not.in.({list})")));
        }
        self
    }

    #[must_use]
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(format!("{column}.desc"));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters only, as used by `PATCH`.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        self.filters.clone()
    }

    /// Full query string for `GET`.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Extract the total from a `Content-Range` header such as `0-0/42` or `*/0`.
///
/// Returns `None` when the server did not compute a total (`0-9/*`).
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.parse().ok()
}

/// PostgREST client bound to one project.
#[derive(Clone)]
pub struct PostgrestClient {
    http: Client,
    rest_url: String,
    api_key: String,
}

impl PostgrestClient {
    /// Create a client for a project URL such as `https://xyz.supabase.co`.
    pub fn new(project_url: &str, api_key: &str, http: Client) -> AppResult<Self> {
        let parsed = url::Url::parse(project_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Config(format!("unsupported store URL scheme: {}", parsed.scheme())));
        }
        if api_key.trim().is_empty() {
            return Err(AppError::Config("store API key is empty".to_string()));
        }

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(table: &str, response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::StoreStatus {
            table: table.to_string(),
            status,
            body,
        })
    }

    /// Fetch rows matching `query`.
    pub async fn select<T: DeserializeOwned>(&self, query: &Query) -> AppResult<Vec<T>> {
        let response = self.request(Method::GET, query.name()).query(&query.params()).send().await?;
        let response = Self::check(query.name(), response).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    /// Exact row count for `query`.
    ///
    /// Asks the server for `count=exact`; if no total comes back in
    /// `Content-Range`, falls back to fetching the projected column and
    /// counting rows.
    pub async fn count(&self, query: &Query) -> AppResult<u64> {
        let probe = query.clone().limit(1);
        let response = self
            .request(Method::GET, query.name())
            .header("Prefer", "count=exact")
            .query(&probe.params())
            .send()
            .await?;
        let response = Self::check(query.name(), response).await?;

        if let Some(total) = content_range_total(response.headers()) {
            return Ok(total);
        }

        log::warn!("No exact count for table {}, counting fetched rows instead", query.name());
        let rows: Vec<serde_json::Value> = self.select(query).await?;
        Ok(rows.len() as u64)
    }

    /// Append one row.
    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> AppResult<()> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        Self::check(table, response).await?;
        Ok(())
    }

    /// Patch every row matching `query`; returns how many rows changed.
    pub async fn update<T: Serialize + ?Sized>(&self, query: &Query, patch: &T) -> AppResult<usize> {
        let response = self
            .request(Method::PATCH, query.name())
            .header("Prefer", "return=representation")
            .query(&query.filter_params())
            .json(patch)
            .send()
            .await?;
        let response = Self::check(query.name(), response).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len())
    }

    /// Insert or merge a row on `conflict_key`.
    pub async fn upsert<T: Serialize + ?Sized>(&self, table: &str, row: &T, conflict_key: &str) -> AppResult<()> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", conflict_key)])
            .json(row)
            .send()
            .await?;
        Self::check(table, response).await?;
        Ok(())
    }
}

fn content_range_total(headers: &HeaderMap<HeaderValue>) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_query_renders_postgrest_filters() {
        let query = Query::table("questions")
            .select("id,question")
            .not_in("id", &[3, 5, 8])
            .limit(50);

        assert_eq!(
            query.params(),
            pairs(&[("select", "id,question"), ("id", "not.in.(3,5,8)"), ("limit", "50")])
        );
    }

    #[test]
    fn test_not_in_with_empty_set_is_dropped() {
        let query = Query::table("questions").not_in("id", &[]);
        assert_eq!(query.params(), pairs(&[("select", "*")]));
    }

    #[test]
    fn test_order_and_equality_filters() {
        let query = Query::table("answers")
            .select("id")
            .eq("user_id", 42)
            .is("is_correct", "true")
            .order_desc("answered_at");

        assert_eq!(
            query.params(),
            pairs(&[
                ("select", "id"),
                ("user_id", "eq.42"),
                ("is_correct", "is.true"),
                ("order", "answered_at.desc"),
            ])
        );
        assert_eq!(
            query.filter_params(),
            pairs(&[("user_id", "eq.42"), ("is_correct", "is.true")])
        );
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_client_rejects_bad_configuration() {
        let http = Client::new();
        assert!(PostgrestClient::new("not a url", "key", http.clone()).is_err());
        assert!(PostgrestClient::new("ftp://example.com", "key", http.clone()).is_err());
        assert!(PostgrestClient::new("https://example.supabase.co", " ", http).is_err());
    }
}
