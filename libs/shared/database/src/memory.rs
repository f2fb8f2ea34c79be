// =====================================================================================
// IN-PROCESS RECORD STORE
// =====================================================================================

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{Direction, Filter, FilterOp, Query, RecordStore, StoreError};

/// Table-per-`Vec` store used when no PostgREST endpoint is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    unavailable: RwLock<HashSet<String>>,
    offline: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation on `table` fail until re-enabled.
    pub async fn set_table_unavailable(&self, table: &str, unavailable: bool) {
        let mut tables = self.unavailable.write().await;
        if unavailable {
            tables.insert(table.to_string());
        } else {
            tables.remove(table);
        }
    }

    /// Makes `ping` and every table operation fail.
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    async fn ensure_available(&self, table: &str) -> Result<(), StoreError> {
        if *self.offline.read().await {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        if self.unavailable.read().await.contains(table) {
            return Err(StoreError::Unavailable(format!("table {} is unavailable", table)));
        }
        Ok(())
    }
}

fn with_id(mut row: Value) -> Value {
    if let Value::Object(map) = &mut row {
        map.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    }
    row
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => match (parse_time(a), parse_time(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => Some(a.cmp(b)),
        },
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Some(Ordering::Equal) || left == right
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let field = row.get(&filter.column).unwrap_or(&Value::Null);
    match &filter.op {
        FilterOp::Eq(value) => values_equal(field, value),
        FilterOp::Gt(value) => compare_values(field, value) == Some(Ordering::Greater),
        FilterOp::Gte(value) => matches!(
            compare_values(field, value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt(value) => compare_values(field, value) == Some(Ordering::Less),
        FilterOp::Lte(value) => matches!(
            compare_values(field, value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::In(values) => values.iter().any(|value| values_equal(field, value)),
        // SQL semantics: NULL is never NOT IN anything.
        FilterOp::NotIn(values) => {
            !field.is_null() && !values.iter().any(|value| values_equal(field, value))
        }
        FilterOp::IsNull => field.is_null(),
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches(row, filter))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        self.ensure_available(table).await?;
        let row = with_id(row);
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<u64, StoreError> {
        self.ensure_available(table).await?;
        let count = rows.len() as u64;
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows.into_iter().map(with_id));
        Ok(count)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.ensure_available(table).await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, direction)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                )
                .unwrap_or(Ordering::Equal);
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(offset) = query.offset {
            rows.drain(..offset.min(rows.len()));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<u64, StoreError> {
        self.ensure_available(table).await?;
        let Value::Object(patch) = patch else {
            return Err(StoreError::UnexpectedResponse(
                "update patch must be a JSON object".to_string(),
            ));
        };

        let mut tables = self.tables.write().await;
        let mut touched = 0;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                if let Value::Object(fields) = row {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        self.ensure_available(table).await?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches_all(row, filters));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        self.ensure_available(table).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| matches_all(row, filters)).count() as u64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if *self.offline.read().await {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}
