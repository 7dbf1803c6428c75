//! Offline support for Brannvern
//!
//! Writes made while the device has no connection are recorded in a
//! persistent ledger and replayed against the backend once connectivity
//! returns. Reads fall back to the last-known-good responses in the cache.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod runner;

#[cfg(test)]
mod test_support;

pub use change::{ChangeOperation, OperationKind, PendingChange};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, ListenerId};
pub use context::{Cached, OfflineConfig, OfflineContext, WriteOutcome};
pub use error::{OfflineError, Result};
pub use ledger::{LedgerConfig, PendingLedger};
pub use policy::RetryPolicy;
pub use runner::{SyncReport, SyncRunner, SyncStatus};
