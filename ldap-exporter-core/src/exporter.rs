//! Scrape orchestration over every configured source.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::directory::Directory;
use crate::error::{ConfigError, ScrapeError};
use crate::metric::{MetricDesc, MetricKind, NAMESPACE, Sample};
use crate::source::MetricsSource;

/// Counters about the exporter's own scrapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeStats {
    /// Number of scrapes started.
    pub scrapes_total: u64,
    /// Failed sources summed over every scrape.
    pub errors_total: u64,
    /// Failed sources in the last completed scrape.
    pub last_scrape_errors: u64,
    pub last_scrape_duration: Duration,
}

struct SelfDescs {
    duration: Arc<MetricDesc>,
    last_error: Arc<MetricDesc>,
    scrapes: Arc<MetricDesc>,
    errors: Arc<MetricDesc>,
}

impl SelfDescs {
    fn new() -> Self {
        let desc = |name: &str, help: &str, kind| {
            Arc::new(MetricDesc {
                name: format!("{NAMESPACE}_exporter_{name}"),
                help: help.to_string(),
                kind,
                label_names: Vec::new(),
                const_labels: BTreeMap::new(),
            })
        };

        Self {
            duration: desc(
                "last_scrape_duration_seconds",
                "Duration of the last scrape of metrics from LDAP.",
                MetricKind::Gauge,
            ),
            last_error: desc(
                "last_scrape_error",
                "Count of individual LDAP queries in the last scrape that failed. Zero is success, anything else is failures.",
                MetricKind::Gauge,
            ),
            scrapes: desc(
                "scrapes_total",
                "Total number of times LDAP was scraped for metrics.",
                MetricKind::Counter,
            ),
            errors: desc(
                "errors_total",
                "Total number of times the exporter experienced errors collecting LDAP metrics.",
                MetricKind::Counter,
            ),
        }
    }

    fn all(&self) -> [&MetricDesc; 4] {
        [&self.duration, &self.last_error, &self.scrapes, &self.errors]
    }
}

/// Runs every source against a shared directory and reports the results
/// together with self-metrics.
pub struct Exporter {
    directory: Arc<dyn Directory>,
    sources: Vec<MetricsSource>,
    self_descs: SelfDescs,
    stats: Mutex<ScrapeStats>,
}

impl Exporter {
    /// Create an exporter.
    ///
    /// Fails when two descriptors sharing a metric name disagree on type,
    /// help or label names, or when they cannot be told apart by their
    /// constant labels.
    pub fn new(directory: Arc<dyn Directory>, sources: Vec<MetricsSource>) -> Result<Self, ConfigError> {
        let self_descs = SelfDescs::new();

        let descs = self_descs
            .all()
            .into_iter()
            .chain(sources.iter().flat_map(MetricsSource::descs));
        check_registry(descs)?;

        debug!(sources = sources.len(), "Exporter created");

        Ok(Self {
            directory,
            sources,
            self_descs,
            stats: Mutex::new(ScrapeStats::default()),
        })
    }

    pub fn sources(&self) -> &[MetricsSource] {
        &self.sources
    }

    /// Descriptors of every configured metric attribute.
    pub fn describe(&self) -> Vec<&MetricDesc> {
        self.sources.iter().flat_map(MetricsSource::descs).collect()
    }

    /// Snapshot of the self-metric counters.
    pub fn stats(&self) -> ScrapeStats {
        self.stats.lock().clone()
    }

    /// Run one scrape cycle.
    ///
    /// A failing source is logged and counted; the remaining sources are
    /// still scraped.
    pub async fn collect(&self) -> Vec<Sample> {
        let start = Instant::now();
        self.stats.lock().scrapes_total += 1;

        let mut samples = Vec::new();
        let mut failures = 0u64;

        for source in &self.sources {
            match self.scrape_source(source).await {
                Ok(source_samples) => {
                    debug!(
                        source = source.name(),
                        samples = source_samples.len(),
                        "Scraped metrics source"
                    );
                    samples.extend(source_samples);
                }
                Err(e) => {
                    failures += 1;
                    error!(
                        source = source.name(),
                        search = %source,
                        error = %e,
                        "Failed to scrape metrics source"
                    );
                }
            }
        }

        let stats = {
            let mut stats = self.stats.lock();
            stats.last_scrape_duration = start.elapsed();
            stats.last_scrape_errors = failures;
            stats.errors_total += failures;
            stats.clone()
        };

        samples.extend(self.self_samples(&stats));
        samples
    }

    async fn scrape_source(&self, source: &MetricsSource) -> Result<Vec<Sample>, ScrapeError> {
        let entries = self.directory.search(source.request()).await?;
        source.scrape_entries(&entries)
    }

    fn self_samples(&self, stats: &ScrapeStats) -> [Sample; 4] {
        let sample = |desc: &Arc<MetricDesc>, value: f64| Sample {
            desc: desc.clone(),
            value,
            label_values: Vec::new(),
        };

        [
            sample(
                &self.self_descs.duration,
                stats.last_scrape_duration.as_secs_f64(),
            ),
            sample(&self.self_descs.last_error, stats.last_scrape_errors as f64),
            sample(&self.self_descs.scrapes, stats.scrapes_total as f64),
            sample(&self.self_descs.errors, stats.errors_total as f64),
        ]
    }
}

fn check_registry<'a>(descs: impl Iterator<Item = &'a MetricDesc>) -> Result<(), ConfigError> {
    let mut families: HashMap<&str, Vec<&MetricDesc>> = HashMap::new();

    for desc in descs {
        let family = families.entry(desc.name.as_str()).or_default();

        if let Some(first) = family.first() {
            if first.kind != desc.kind {
                return Err(ConfigError::Registry(format!(
                    "metric {} registered as both {} and {}",
                    desc.name,
                    first.kind.as_str(),
                    desc.kind.as_str()
                )));
            }
            if first.help != desc.help {
                return Err(ConfigError::Registry(format!(
                    "metric {} registered with different help texts: '{}' and '{}'",
                    desc.name, first.help, desc.help
                )));
            }
            if first.label_names != desc.label_names
                || !first.const_labels.keys().eq(desc.const_labels.keys())
            {
                return Err(ConfigError::Registry(format!(
                    "metric {} registered with different label names",
                    desc.name
                )));
            }
            if family.iter().any(|d| d.const_labels == desc.const_labels) {
                return Err(ConfigError::Registry(format!(
                    "metric {} registered twice with constant labels {:?}",
                    desc.name, desc.const_labels
                )));
            }
        }

        family.push(desc);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::directory::{DirectoryEntry, StaticDirectory};

    const MONITOR: &str = r#"
- name: monitor
  search: cn=monitor
  attributes:
    metrics:
      threads: {type: gauge, help: Worker threads}
"#;

    #[tokio::test]
    async fn test_collect_includes_self_metrics() {
        let directory = StaticDirectory::new().with_entries(
            "cn=monitor",
            vec![DirectoryEntry::new("cn=monitor").with_attribute("threads", ["16"])],
        );
        let exporter = Exporter::new(Arc::new(directory), load_config(MONITOR).unwrap()).unwrap();

        let samples = exporter.collect().await;

        let names: Vec<&str> = samples.iter().map(|s| s.desc.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ldap_monitor_threads",
                "ldap_exporter_last_scrape_duration_seconds",
                "ldap_exporter_last_scrape_error",
                "ldap_exporter_scrapes_total",
                "ldap_exporter_errors_total",
            ]
        );
        assert_eq!(samples[0].value, 16.0);
        assert_eq!(samples[2].value, 0.0);
        assert_eq!(samples[3].value, 1.0);
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let directory = StaticDirectory::new().with_failure("cn=monitor", "busy");
        let exporter = Exporter::new(Arc::new(directory), load_config(MONITOR).unwrap()).unwrap();

        exporter.collect().await;
        exporter.collect().await;

        let stats = exporter.stats();
        assert_eq!(stats.scrapes_total, 2);
        assert_eq!(stats.errors_total, 2);
        assert_eq!(stats.last_scrape_errors, 1);
    }

    #[test]
    fn test_describe() {
        let exporter = Exporter::new(
            Arc::new(StaticDirectory::new()),
            load_config(MONITOR).unwrap(),
        )
        .unwrap();

        let descs = exporter.describe();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].name, "ldap_monitor_threads");
    }

    #[test]
    fn test_same_name_different_const_labels_is_allowed() {
        let config = r#"
- search: cn=a
  attributes:
    metrics:
      ops: {type: counter, metric_name: ops_total, help: Ops}
  labels: {instance: a}
- search: cn=b
  attributes:
    metrics:
      ops: {type: counter, metric_name: ops_total, help: Ops}
  labels: {instance: b}
"#;
        assert!(Exporter::new(Arc::new(StaticDirectory::new()), load_config(config).unwrap()).is_ok());
    }

    #[test]
    fn test_conflicting_descriptors_are_rejected() {
        let duplicate = r#"
- search: cn=a
  attributes:
    metrics:
      ops: {type: counter, metric_name: ops_total, help: Ops}
- search: cn=b
  attributes:
    metrics:
      ops: {type: counter, metric_name: ops_total, help: Ops}
"#;
        let kind = r#"
- search: cn=a
  attributes:
    metrics:
      ops: {type: counter, metric_name: ops, help: Ops}
  labels: {instance: a}
- search: cn=b
  attributes:
    metrics:
      ops: {type: gauge, metric_name: ops, help: Ops}
  labels: {instance: b}
"#;
        let self_metric = r#"
- search: cn=a
  attributes:
    metrics:
      x: {type: counter, metric_name: exporter_scrapes_total, help: Oops}
"#;

        for config in [duplicate, kind, self_metric] {
            let result = Exporter::new(Arc::new(StaticDirectory::new()), load_config(config).unwrap());
            assert!(matches!(result, Err(ConfigError::Registry(_))));
        }
    }
}
