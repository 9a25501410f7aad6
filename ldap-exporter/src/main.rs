//! Prometheus exporter for LDAP directories.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, error, info};

use ldap_exporter::{ExporterConfig, HttpServer, LdapDirectory, init_tracing, load_vendor_sources};
use ldap_exporter_core::{Exporter, load_config_file};

/// Prometheus exporter for LDAP directories.
#[derive(Parser, Debug)]
#[command(name = "ldap-exporter")]
#[command(about = "Export LDAP attributes as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// LDAP server URI (overrides config).
    #[arg(long)]
    ldap_uri: Option<String>,

    /// DN to bind as (overrides config).
    #[arg(long)]
    ldap_bind: Option<String>,

    /// Password for the bind DN (overrides config).
    #[arg(long, env = "LDAP_PASSWORD", hide_env_values = true)]
    ldap_password: Option<String>,

    /// YAML file holding the LDAP to metrics mappings (overrides config).
    #[arg(long)]
    metrics_config: Option<PathBuf>,

    /// Do not load the built-in metrics of the detected LDAP vendor.
    #[arg(long)]
    disable_vendor_metrics: bool,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Apply command line overrides on top of the loaded configuration.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(uri) = self.ldap_uri {
            config.ldap.uri = uri;
        }
        if let Some(bind_dn) = self.ldap_bind {
            config.ldap.bind_dn = Some(bind_dn);
        }
        if let Some(password) = self.ldap_password {
            config.ldap.bind_password = Some(password);
        }
        if let Some(path) = self.metrics_config {
            config.metrics.config = Some(path);
        }
        if self.disable_vendor_metrics {
            config.metrics.disable_vendor_metrics = true;
        }
        if let Some(listen) = self.listen {
            config.http.listen = listen;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ExporterConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ExporterConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging)?;

    info!("Starting LDAP Exporter");

    let directory = Arc::new(
        LdapDirectory::connect(&config.ldap)
            .await
            .context("Failed to connect to LDAP server")?,
    );

    let mut sources = Vec::new();
    if let Some(path) = &config.metrics.config {
        let configured = load_config_file(path)
            .with_context(|| format!("Failed to load metrics config from {}", path.display()))?;
        debug!(sources = configured.len(), "Loaded sources from metrics config");
        sources.extend(configured);
    }

    if !config.metrics.disable_vendor_metrics {
        sources.extend(load_vendor_sources(&*directory).await?);
    }

    if sources.is_empty() {
        bail!("no metrics were configured; nothing to export");
    }

    let exporter = Arc::new(
        Exporter::new(directory.clone(), sources).context("Failed to register metrics")?,
    );

    let listen_addr: SocketAddr = config
        .http
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(exporter.clone(), listen_addr, config.http.path.clone());
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!(
        sources = exporter.sources().len(),
        "Telemetry accessible at {}{}", config.http.listen, config.http.path
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    directory.unbind().await;

    let stats = exporter.stats();
    info!(
        scrapes = stats.scrapes_total,
        errors = stats.errors_total,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
