//! Observability and telemetry.
//!
//! Structured logging through `tracing` with an env-filter
//! (`SCRUBGATE_LOG`), and an optional Prometheus exporter for the `metrics`
//! facade. Initialized once at startup; logs go to stderr so command output
//! stays clean on stdout.

use crate::config::ObservabilitySettings;
use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable controlling the log filter.
pub const ENV_LOG_FILTER: &str = "SCRUBGATE_LOG";

/// Options for initialization.
#[derive(Debug, Clone, Copy)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
}

/// Initializes logging and, when enabled, the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the subscriber is already set or
/// the metrics exporter cannot bind its listener.
pub fn init(settings: &ObservabilitySettings, options: InitOptions) -> Result<()> {
    let default_filter = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(ENV_LOG_FILTER)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    let init_result = if settings.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    init_result.map_err(|e| Error::OperationFailed {
        operation: "init_logging".to_string(),
        cause: e.to_string(),
    })?;

    if settings.metrics_enabled {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.metrics_port);
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| Error::OperationFailed {
                operation: "init_metrics".to_string(),
                cause: e.to_string(),
            })?;
        tracing::info!(%addr, "prometheus metrics exporter listening");
    }

    Ok(())
}
