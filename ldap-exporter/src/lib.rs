//! Prometheus exporter for LDAP directories.
//!
//! On every scrape of the metrics endpoint the exporter runs the configured
//! LDAP searches and exposes the selected attributes as counters and gauges.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   LDAP Server   │<───>│    Exporter     │<────│   HTTP Server   │
//! │  (cn=monitor)   │     │ (search, parse) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! ldap-exporter --config config.json5 --metrics-config metrics.yaml
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for process options and
//! [`ldap_exporter_core::config`] for the metrics document.

pub mod config;
pub mod http;
pub mod ldap;
pub mod vendor;

pub use config::{ExporterConfig, LogFormat, LoggingConfig};
pub use http::HttpServer;
pub use ldap::LdapDirectory;
pub use vendor::{Vendor, load_vendor_sources};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}
