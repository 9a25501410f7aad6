//! Typed metric attributes: turn one LDAP attribute into samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::directory::EntryAttribute;
use crate::error::ScrapeError;
use crate::template::Template;

/// Namespace prefixed to every exported metric name.
pub const NAMESPACE: &str = "ldap";

/// Help text used when a metric does not configure one.
pub const DEFAULT_HELP: &str = "No help provided";

/// Metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    /// Parse a configured metric type.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "counter" => Some(MetricKind::Counter),
            "gauge" => Some(MetricKind::Gauge),
            _ => None,
        }
    }

    /// Name used in the `# TYPE` line of the exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Check a metric name against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Check a label name against `[a-zA-Z_][a-zA-Z0-9_]*`.
///
/// Names starting with `__` are reserved and rejected.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Description of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    /// Variable label names, in the order label values are supplied.
    pub label_names: Vec<String>,
    pub const_labels: BTreeMap<String, String>,
}

impl MetricDesc {
    /// Build a descriptor, validating the metric and label names.
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        label_names: Vec<String>,
        const_labels: BTreeMap<String, String>,
    ) -> Result<Self, String> {
        let name = name.into();
        if !is_valid_metric_name(&name) {
            return Err(format!("'{}' is not a valid metric name", name));
        }

        let mut seen = std::collections::HashSet::new();
        for label in label_names.iter().chain(const_labels.keys()) {
            if !is_valid_label_name(label) {
                return Err(format!(
                    "metric {}: '{}' is not a valid label name",
                    name, label
                ));
            }
            if !seen.insert(label.as_str()) {
                return Err(format!("metric {}: duplicate label name '{}'", name, label));
            }
        }

        Ok(Self {
            name,
            help: help.into(),
            kind,
            label_names,
            const_labels,
        })
    }
}

/// One concrete observation of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub desc: Arc<MetricDesc>,
    pub value: f64,
    /// Values for `desc.label_names`, in the same order.
    pub label_values: Vec<String>,
}

impl Sample {
    /// Create a sample, checking the label value count against the descriptor.
    pub fn new(desc: Arc<MetricDesc>, value: f64, label_values: Vec<String>) -> Result<Self, ScrapeError> {
        if label_values.len() != desc.label_names.len() {
            return Err(ScrapeError::LabelCardinality {
                metric: desc.name.clone(),
                expected: desc.label_names.len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            desc,
            value,
            label_values,
        })
    }

    /// Value of a label, variable or constant.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
            .or_else(|| self.desc.const_labels.get(name).map(String::as_str))
    }
}

/// Shared state of both metric attribute variants.
#[derive(Debug, PartialEq)]
pub struct AttributeMetric {
    desc: Arc<MetricDesc>,
    translator: Option<Template>,
}

/// How one LDAP attribute becomes samples.
#[derive(Debug, PartialEq)]
pub enum MetricAttribute {
    /// Monotonic since collector start; raw values parse as `u64`.
    Counter(AttributeMetric),
    /// Raw values parse as `f64`.
    Gauge(AttributeMetric),
}

impl MetricAttribute {
    /// Create the attribute matching `desc.kind`.
    pub fn new(desc: MetricDesc, translator: Option<Template>) -> Self {
        let kind = desc.kind;
        let metric = AttributeMetric {
            desc: Arc::new(desc),
            translator,
        };
        match kind {
            MetricKind::Counter => MetricAttribute::Counter(metric),
            MetricKind::Gauge => MetricAttribute::Gauge(metric),
        }
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.metric().desc
    }

    pub fn translator(&self) -> Option<&Template> {
        self.metric().translator.as_ref()
    }

    fn metric(&self) -> &AttributeMetric {
        match self {
            MetricAttribute::Counter(m) | MetricAttribute::Gauge(m) => m,
        }
    }

    /// Turn one attribute's values into samples.
    ///
    /// `labels` are the entry level labels collected by the source. A
    /// translation's own labels take precedence over them.
    pub fn parse(
        &self,
        labels: &BTreeMap<String, String>,
        attribute: &EntryAttribute,
    ) -> Result<Vec<Sample>, ScrapeError> {
        match self {
            MetricAttribute::Counter(m) => m.parse(labels, attribute, parse_counter),
            MetricAttribute::Gauge(m) => m.parse(labels, attribute, parse_gauge),
        }
    }
}

impl AttributeMetric {
    fn parse(
        &self,
        labels: &BTreeMap<String, String>,
        attribute: &EntryAttribute,
        parse_raw: fn(&str, &str) -> Result<f64, ScrapeError>,
    ) -> Result<Vec<Sample>, ScrapeError> {
        let Some(translator) = &self.translator else {
            if attribute.values.len() != 1 {
                return Err(ScrapeError::ValueCount {
                    attribute: attribute.name.clone(),
                    count: attribute.values.len(),
                });
            }
            let value = parse_raw(&attribute.name, &attribute.values[0])?;
            let label_values = build_ordered_labels(&self.desc.label_names, &[labels])?;
            return Ok(vec![Sample::new(self.desc.clone(), value, label_values)?]);
        };

        let translations =
            translator
                .translate(&attribute.values)
                .map_err(|e| ScrapeError::Translation {
                    attribute: attribute.name.clone(),
                    source: e,
                })?;

        translations
            .iter()
            .map(|translation| {
                let label_values =
                    build_ordered_labels(&self.desc.label_names, &[&translation.labels, labels])?;
                Sample::new(self.desc.clone(), translation.value, label_values)
            })
            .collect()
    }
}

fn parse_counter(attribute: &str, raw: &str) -> Result<f64, ScrapeError> {
    raw.parse::<u64>()
        .map(|v| v as f64)
        .map_err(|e| ScrapeError::ParseCounter {
            attribute: attribute.to_string(),
            value: raw.to_string(),
            source: e,
        })
}

fn parse_gauge(attribute: &str, raw: &str) -> Result<f64, ScrapeError> {
    raw.parse::<f64>().map_err(|e| ScrapeError::ParseGauge {
        attribute: attribute.to_string(),
        value: raw.to_string(),
        source: e,
    })
}

/// Resolve label values for `label_names`, searching `sources` in order.
fn build_ordered_labels(
    label_names: &[String],
    sources: &[&BTreeMap<String, String>],
) -> Result<Vec<String>, ScrapeError> {
    label_names
        .iter()
        .map(|name| {
            sources
                .iter()
                .find_map(|source| source.get(name).cloned())
                .ok_or_else(|| ScrapeError::MissingLabel {
                    label: name.clone(),
                    sources: sources
                        .iter()
                        .map(|source| source.keys().cloned().collect())
                        .collect(),
                })
        })
        .collect()
}
