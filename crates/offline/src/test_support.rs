//! Shared test doubles

use async_trait::async_trait;
use backend_client::{BackendError, RemoteStore, Row, SelectQuery};

mockall::mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteStore for Remote {
        async fn insert(&self, table: &str, row: &Row) -> Result<(), BackendError>;
        async fn update(&self, table: &str, id: &str, changes: &Row) -> Result<(), BackendError>;
        async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError>;
        async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, BackendError>;
    }
}
