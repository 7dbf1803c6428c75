//! HTTP client for the backend's REST surface
//!
//! Rows live under `{service_url}/rest/v1/{table}`. Inserts are `POST`s,
//! updates are `PATCH`es and deletes are `DELETE`s filtered with `id=eq.{id}`.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response as ReqwestResponse};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::{BackendError, ErrorBody};
use crate::records::Table;
use crate::remote::{RemoteStore, Row, SelectQuery};

/// Client for the hosted backend
///
/// # Examples
/// ```
/// use backend_client::{BackendClient, BackendConfig, Customer};
///
/// async fn example() -> Result<(), backend_client::BackendError> {
///     let config = BackendConfig::new("https://project.example.co", "anon-key");
///     let client = BackendClient::new(config)?;
///
///     client.insert_record(&Customer::new("c1", "Acme")).await?;
///     let customers: Vec<Customer> = client.fetch_all().await?;
///     println!("{} customers", customers.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: ReqwestClient,
    config: BackendConfig,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| BackendError::new(0, "ClientError", format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Get the client configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Insert a typed record
    pub async fn insert_record<R: Table>(&self, record: &R) -> Result<(), BackendError> {
        let row = record.to_row().map_err(serialization_error)?;
        self.insert(R::TABLE, &row).await
    }

    /// Fetch every record of a typed table
    pub async fn fetch_all<R: Table>(&self) -> Result<Vec<R>, BackendError> {
        self.fetch(&SelectQuery::all()).await
    }

    /// Fetch typed records matching `query`
    pub async fn fetch<R: Table>(&self, query: &SelectQuery) -> Result<Vec<R>, BackendError> {
        let rows = self.select(R::TABLE, query).await?;
        rows.into_iter().map(|row| R::from_row(row).map_err(parse_error)).collect()
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, self.config.table_url(table))
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.config.bearer_token());

        for (key, value) in &self.config.default_headers {
            req = req.header(key, value);
        }

        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<ReqwestResponse, BackendError> {
        let response = req
            .send()
            .await
            .map_err(|e| BackendError::transport(format!("Request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) => Err(BackendError::new(
                status,
                error.code.unwrap_or_else(|| "Unknown".to_string()),
                error.message,
            )),
            Err(_) => Err(BackendError::new(status, "Unknown", format!("HTTP {status}: {body}"))),
        }
    }
}

fn serialization_error(e: serde_json::Error) -> BackendError {
    BackendError::new(0, "SerializationError", e.to_string())
}

fn parse_error(e: serde_json::Error) -> BackendError {
    BackendError::new(0, "ParseError", format!("Failed to parse JSON: {e}"))
}

#[async_trait]
impl RemoteStore for BackendClient {
    async fn insert(&self, table: &str, row: &Row) -> Result<(), BackendError> {
        tracing::debug!(table, "insert");
        let req = self.request(Method::POST, table).header("Prefer", "return=minimal").json(row);
        self.send(req).await?;
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, changes: &Row) -> Result<(), BackendError> {
        tracing::debug!(table, id, "update");
        let req = self
            .request(Method::PATCH, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(changes);
        self.send(req).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        tracing::debug!(table, id, "delete");
        let req = self.request(Method::DELETE, table).query(&[("id", format!("eq.{id}"))]);
        self.send(req).await?;
        Ok(())
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, BackendError> {
        let req = self.request(Method::GET, table).query(&query.to_params());
        let response = self.send(req).await?;

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::transport(format!("Failed to read response: {e}")))?;

        let rows: Vec<Value> = serde_json::from_str(&body).map_err(parse_error)?;
        rows.into_iter()
            .map(|value| match value {
                Value::Object(row) => Ok(row),
                other => Err(BackendError::new(
                    0,
                    "ParseError",
                    format!("Expected a row object, got {other}"),
                )),
            })
            .collect()
    }
}
