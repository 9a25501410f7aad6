//! LDAP Exporter Core
//!
//! Turns declaratively configured LDAP searches into Prometheus samples:
//!
//! - [`config`] - Metrics configuration loading (YAML format)
//! - [`template`] - MiniJinja naming and value translation templates
//! - [`metric`] - Counter and gauge attributes, descriptors and samples
//! - [`source`] - One search and its attribute mappings
//! - [`exporter`] - Scrape orchestration and self-metrics
//! - [`exposition`] - Prometheus text format rendering
//! - [`directory`] - Search requests and the `Directory` client trait
//! - [`syntax`] - DN and search filter validation
//! - [`error`] - Error types

pub mod config;
pub mod directory;
pub mod error;
pub mod exporter;
pub mod exposition;
pub mod metric;
pub mod source;
pub mod syntax;
pub mod template;

// Re-export commonly used types at the crate root
pub use config::{load_config, load_config_file};
pub use directory::{
    DerefAliases, Directory, DirectoryEntry, EntryAttribute, MATCH_ALL_FILTER, Scope,
    SearchRequest, StaticDirectory,
};
pub use error::{ConfigError, DirectoryError, Result, ScrapeError, TemplateError};
pub use exporter::{Exporter, ScrapeStats};
pub use exposition::{CONTENT_TYPE, render};
pub use metric::{MetricAttribute, MetricDesc, MetricKind, Sample};
pub use source::MetricsSource;
pub use template::{Template, Translation};
