//! Logging setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "brannvern=info,offline=info,storage=warn,backend_client=info";

/// Install the global tracing subscriber
///
/// Honours `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Returns an error
/// if a global subscriber is already installed.
pub fn init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
