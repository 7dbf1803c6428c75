//! Brannvern client core
//!
//! Offline-capable data layer for the Brannvern inspection office: local
//! storage, the backend client and the offline sync layer, re-exported from
//! one crate for the application shell.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod logging;

pub use backend_client;
pub use offline;
pub use storage;

pub use backend_client::{BackendClient, BackendConfig, Customer, Facility, Inspection};
pub use offline::{
    ConnectivityMonitor, ConnectivityState, OfflineConfig, OfflineContext, SyncReport, SyncStatus,
};
pub use storage::{KvConfig, KvStore};
