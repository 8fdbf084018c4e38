//! # Vote Telemetry
//!
//! Ambient observability for the vote lifecycle engine.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, pretty or JSON output
//! - **Metrics**: Prometheus text exposition of the default registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vote_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! // ...
//! let scrape = vote_telemetry::encode_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `VL_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `VL_JSON_LOGS` | `false` | JSON log lines |
//! | `VL_SERVICE_NAME` | `vote-lifecycle` | Service name in the startup line |

mod config;
mod logging;
mod metrics;

pub use config::{TelemetryConfig, DEFAULT_LOG_LEVEL, DEFAULT_SERVICE_NAME};
pub use logging::{env_filter, init_logging};
pub use metrics::{content_type, encode_metrics};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),

    #[error("Failed to encode metrics: {0}")]
    Metrics(String),
}

/// Initialize logging. Returns a guard that logs on shutdown.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active for the application's lifetime.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
