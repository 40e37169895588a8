//! Structured logging setup

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for [`init_tracing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Initialize tracing with structured logging.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Returns `false` if a
/// global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(true).json())
            .try_init()
            .is_ok(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .is_ok(),
    };

    if installed {
        info!(?format, "genai-retry tracing initialized");
    }
    installed
}
