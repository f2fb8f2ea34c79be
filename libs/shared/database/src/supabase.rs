use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

use crate::store::{Direction, Filter, FilterOp, Query, RecordStore, StoreError};

/// Rows requested per GET. PostgREST may cap a response below this
/// (`max-rows`), so paging follows the `Content-Range` total, not page fullness.
const PAGE_SIZE: usize = 1000;

/// PostgREST-backed [`RecordStore`].
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self, prefer: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_str(prefer)?);
        }

        Ok(headers)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str, prefer: Option<&str>) -> Result<RequestBuilder, StoreError> {
        let url = self.table_url(table);
        debug!("Making {} request to {}", method, url);
        Ok(self.client.request(method, &url).headers(self.get_headers(prefer)?))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("PostgREST error ({}): {}", status, error_text);
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response)
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn list_literal(values: &[Value]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|value| match value {
            Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            other => literal(other),
        })
        .collect();
    format!("({})", items.join(","))
}

/// Renders filters as PostgREST query parameters (`column=op.value`).
pub fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| {
            let expression = match &filter.op {
                FilterOp::Eq(value) => format!("eq.{}", literal(value)),
                FilterOp::Gt(value) => format!("gt.{}", literal(value)),
                FilterOp::Gte(value) => format!("gte.{}", literal(value)),
                FilterOp::Lt(value) => format!("lt.{}", literal(value)),
                FilterOp::Lte(value) => format!("lte.{}", literal(value)),
                FilterOp::In(values) => format!("in.{}", list_literal(values)),
                FilterOp::NotIn(values) => format!("not.in.{}", list_literal(values)),
                FilterOp::IsNull => "is.null".to_string(),
            };
            (filter.column.clone(), expression)
        })
        .collect()
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("content-range")
        .and_then(|value| value.to_str().ok())
        .and_then(|range| range.rsplit('/').next())
        .and_then(|total| total.parse().ok())
}

#[async_trait]
impl RecordStore for SupabaseClient {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let request = self
            .request(Method::POST, table, Some("return=representation"))?
            .json(&row);
        let rows: Vec<Value> = self.send(request).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::UnexpectedResponse(format!("insert into {} returned no rows", table)))
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let request = self
            .request(Method::POST, table, Some("return=representation"))?
            .json(&rows);
        let inserted: Vec<Value> = self.send(request).await?.json().await?;
        Ok(inserted.len() as u64)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(&query.filters));
        if let Some((column, direction)) = &query.order {
            let direction = match direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{}", column, direction)));
        }

        let start = query.offset.unwrap_or(0);
        let mut rows: Vec<Value> = Vec::new();
        loop {
            let page_size = match query.limit {
                Some(limit) => limit.saturating_sub(rows.len()).min(PAGE_SIZE),
                None => PAGE_SIZE,
            };
            let mut page_params = params.clone();
            page_params.push(("limit".to_string(), page_size.to_string()));
            page_params.push(("offset".to_string(), (start + rows.len()).to_string()));

            let request = self
                .request(Method::GET, table, Some("count=exact"))?
                .query(&page_params);
            let response = self.send(request).await?;
            let total = content_range_total(&response);
            let page: Vec<Value> = response.json().await?;
            let fetched = page.len();
            rows.extend(page);

            let limit_reached = query.limit.is_some_and(|limit| rows.len() >= limit);
            let exhausted = match total {
                Some(total) => (start + rows.len()) as u64 >= total,
                None => fetched < page_size,
            };
            if limit_reached || exhausted {
                break;
            }
            if fetched == 0 {
                warn!(table, "Page came back empty before the reported total; rows changed mid-read");
                break;
            }
            debug!(table, fetched = rows.len(), ?total, "Fetching next page");
        }

        Ok(rows)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<u64, StoreError> {
        let request = self
            .request(Method::PATCH, table, Some("return=minimal,count=exact"))?
            .query(&filter_params(filters))
            .json(&patch);
        let response = self.send(request).await?;
        Ok(content_range_total(&response).unwrap_or(0))
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let request = self
            .request(Method::DELETE, table, Some("return=minimal,count=exact"))?
            .query(&filter_params(filters));
        let response = self.send(request).await?;
        Ok(content_range_total(&response).unwrap_or(0))
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let request = self
            .request(Method::HEAD, table, Some("count=exact"))?
            .query(&filter_params(filters));
        let response = self.send(request).await?;
        content_range_total(&response).ok_or_else(|| {
            StoreError::UnexpectedResponse(format!("count on {} returned no Content-Range", table))
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/rest/v1/", self.base_url);
        let request = self.client.get(&url).headers(self.get_headers(None)?);
        self.send(request).await?;
        Ok(())
    }
}
