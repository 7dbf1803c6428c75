//! Generic per-table operations against the backend
//!
//! [`RemoteStore`] is the seam between the offline layer and the network:
//! [`crate::BackendClient`] implements it over HTTP and tests substitute
//! in-memory or mocked stores.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BackendError;

/// A database row as a JSON object
pub type Row = Map<String, Value>;

/// Equality filter on a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Column name
    pub column: String,
    /// Value the column must equal
    pub value: String,
}

/// Parameters of a select request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    /// Columns to return; all columns when empty
    pub columns: Vec<String>,
    /// Equality filters, combined with AND
    pub filters: Vec<Filter>,
    /// Column to order by and whether ascending
    pub order: Option<(String, bool)>,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Select all columns of all rows
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict the returned columns
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add an equality filter
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter { column: column.into(), value: value.into() });
        self
    }

    /// Order the result
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    /// Limit the number of rows
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string parameters in the backend's REST dialect
    pub fn to_params(&self) -> Vec<(String, String)> {
        let select = if self.columns.is_empty() { "*".to_string() } else { self.columns.join(",") };
        let mut params = vec![("select".to_string(), select)];

        for filter in &self.filters {
            params.push((filter.column.clone(), format!("eq.{}", filter.value)));
        }

        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{column}.{direction}")));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }
}

/// Generic insert/update/delete/select per named table
///
/// Update and delete match rows on the `id` column.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a row into `table`
    async fn insert(&self, table: &str, row: &Row) -> Result<(), BackendError>;

    /// Apply `changes` to the row of `table` whose `id` equals `id`
    async fn update(&self, table: &str, id: &str, changes: &Row) -> Result<(), BackendError>;

    /// Delete the row of `table` whose `id` equals `id`
    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError>;

    /// Read rows from `table`
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_params() {
        assert_eq!(SelectQuery::all().to_params(), vec![("select".to_string(), "*".to_string())]);
    }

    #[test]
    fn test_select_full_params() {
        let query = SelectQuery::all()
            .columns(["id", "name"])
            .eq("customer_id", "c1")
            .order_by("name", false)
            .limit(20);

        let params = query.to_params();
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "id,name".to_string()),
                ("customer_id".to_string(), "eq.c1".to_string()),
                ("order".to_string(), "name.desc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }
}
