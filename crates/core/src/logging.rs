//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,pathview=debug,pathview_rhi=debug,pathview_renderer=debug";

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG` when present, otherwise [`DEFAULT_FILTER`].
/// Output includes the event target and the emitting thread id.
///
/// # Example
/// ```
/// pathview_core::init_logging();
/// tracing::info!("pathview starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
