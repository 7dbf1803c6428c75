//! Client for the hosted backend used by Brannvern
//!
//! The backend exposes a generic REST surface per table (insert, update,
//! delete, select). This crate provides the HTTP client, the
//! [`RemoteStore`] abstraction the offline layer replays against, and the
//! typed records for the tables the application writes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod records;
pub mod remote;

pub use client::BackendClient;
pub use config::BackendConfig;
pub use error::BackendError;
pub use records::{Customer, Facility, Inspection, InspectionStatus, Table};
pub use remote::{Filter, RemoteStore, Row, SelectQuery};
