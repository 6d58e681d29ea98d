//! Tracing configuration and initialization.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::{SubscriberInitExt as _, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::config::LogVerbosity;

/// Initialize the global tracing subscriber.
///
/// The `CAS_FS_LOG` environment variable overrides the configured
/// verbosity when set (standard `EnvFilter` directives).
pub fn init(verbosity: LogVerbosity) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_env("CAS_FS_LOG")
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .try_init()
}
