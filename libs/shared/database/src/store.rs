// =====================================================================================
// QUERYABLE RECORD STORE
// =====================================================================================

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    IsNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn to_values<T: Serialize>(values: impl IntoIterator<Item = T>) -> Vec<Value> {
    values.into_iter().map(to_value).collect()
}

impl Filter {
    fn new(column: &str, op: FilterOp) -> Self {
        Self {
            column: column.to_string(),
            op,
        }
    }

    pub fn eq(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Eq(to_value(value)))
    }

    pub fn gt(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Gt(to_value(value)))
    }

    pub fn gte(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Gte(to_value(value)))
    }

    pub fn lt(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Lt(to_value(value)))
    }

    pub fn lte(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Lte(to_value(value)))
    }

    pub fn is_in<T: Serialize>(column: &str, values: impl IntoIterator<Item = T>) -> Self {
        Self::new(column, FilterOp::In(to_values(values)))
    }

    pub fn not_in<T: Serialize>(column: &str, values: impl IntoIterator<Item = T>) -> Self {
        Self::new(column, FilterOp::NotIn(to_values(values)))
    }

    pub fn is_null(column: &str) -> Self {
        Self::new(column, FilterOp::IsNull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl From<Vec<Filter>> for Query {
    fn from(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }
}

/// Generic create/find/update/delete/count access over named tables of JSON rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts one row and returns it as stored. An `id` is assigned when absent.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<u64, StoreError>;

    /// Every matching row, up to `query.limit`. Backends that cap response
    /// size must page internally rather than return a truncated result.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Merges `patch` into every matching row and returns the number of rows touched.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<u64, StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Typed helpers layered over [`RecordStore`].
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    async fn find_records<T>(&self, table: &str, query: &Query) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let rows = self.select(table, query).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    async fn find_first<T>(&self, table: &str, filters: Vec<Filter>) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let query = Query::from(filters).limit(1);
        let mut records: Vec<T> = self.find_records(table, &query).await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    async fn insert_record<T>(&self, table: &str, record: &T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let row = serde_json::to_value(record)?;
        let stored = self.insert(table, row).await?;
        Ok(serde_json::from_value(stored)?)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}
