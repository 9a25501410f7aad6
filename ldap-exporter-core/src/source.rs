//! A metrics source: one search plus the attributes it turns into metrics.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::directory::{DerefAliases, DirectoryEntry, Scope, SearchRequest};
use crate::error::ScrapeError;
use crate::metric::{MetricAttribute, MetricDesc, Sample};

/// One configured search and its attribute mappings.
///
/// Built once at load time and read-only afterwards.
#[derive(Debug, PartialEq)]
pub struct MetricsSource {
    name: String,
    request: SearchRequest,
    metric_attributes: BTreeMap<String, MetricAttribute>,
    /// LDAP attribute name -> label name.
    label_attributes: BTreeMap<String, String>,
}

impl MetricsSource {
    /// Create a source. The requested attribute list is derived from the
    /// metric and label attributes.
    pub fn new(
        name: impl Into<String>,
        base_dn: impl Into<String>,
        filter: impl Into<String>,
        scope: Scope,
        deref: DerefAliases,
        metric_attributes: BTreeMap<String, MetricAttribute>,
        label_attributes: BTreeMap<String, String>,
    ) -> Self {
        let mut attributes: Vec<String> = metric_attributes.keys().cloned().collect();
        for attr in label_attributes.keys() {
            if !attributes.contains(attr) {
                attributes.push(attr.clone());
            }
        }

        Self {
            name: name.into(),
            request: SearchRequest::new(base_dn, scope, deref, filter, attributes),
            metric_attributes,
            label_attributes,
        }
    }

    /// Name of the config section this source came from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    pub fn metric_attribute(&self, attribute: &str) -> Option<&MetricAttribute> {
        self.metric_attributes.get(attribute)
    }

    pub fn label_attributes(&self) -> &BTreeMap<String, String> {
        &self.label_attributes
    }

    /// Descriptors of every metric attribute.
    pub fn descs(&self) -> impl Iterator<Item = &MetricDesc> {
        self.metric_attributes.values().map(MetricAttribute::desc)
    }

    /// Turn a search result into samples.
    ///
    /// Any failure rejects the whole result; no samples are returned for a
    /// result that only partially converted.
    pub fn scrape_entries(&self, entries: &[DirectoryEntry]) -> Result<Vec<Sample>, ScrapeError> {
        let mut samples = Vec::new();

        for entry in entries {
            let labels = self.entry_labels(entry)?;

            for attribute in &entry.attributes {
                match self.metric_attributes.get(&attribute.name) {
                    Some(metric) => samples.extend(metric.parse(&labels, attribute)?),
                    None if self.label_attributes.contains_key(&attribute.name) => {}
                    None => {
                        return Err(ScrapeError::UnexpectedAttribute {
                            attribute: attribute.name.clone(),
                        });
                    }
                }
            }
        }

        check_duplicate_series(&samples)?;
        Ok(samples)
    }

    /// Collect the label values of one entry.
    ///
    /// Every label attribute must be present exactly once with a single
    /// value, otherwise the label cardinality would not match the
    /// descriptors.
    fn entry_labels(&self, entry: &DirectoryEntry) -> Result<BTreeMap<String, String>, ScrapeError> {
        let mut labels = BTreeMap::new();

        for attribute in &entry.attributes {
            if let Some(label) = self.label_attributes.get(&attribute.name) {
                if attribute.values.len() != 1 {
                    return Err(ScrapeError::MultiValuedLabel {
                        attribute: attribute.name.clone(),
                        values: attribute.values.clone(),
                    });
                }
                labels.insert(label.clone(), attribute.values[0].clone());
            }
        }

        if labels.len() != self.label_attributes.len() {
            return Err(ScrapeError::IncompleteLabels {
                dn: entry.dn.clone(),
                expected: self
                    .label_attributes
                    .iter()
                    .map(|(a, l)| (a.clone(), l.clone()))
                    .collect(),
                found: labels.into_iter().collect(),
            });
        }

        Ok(labels)
    }
}

/// Two entries of one search can map onto the same series, e.g. a subtree
/// search without label attributes.
fn check_duplicate_series(samples: &[Sample]) -> Result<(), ScrapeError> {
    let mut seen = HashSet::new();
    for sample in samples {
        if !seen.insert((sample.desc.name.as_str(), sample.label_values.as_slice())) {
            return Err(ScrapeError::DuplicateSeries {
                metric: sample.desc.name.clone(),
                label_values: sample.label_values.clone(),
            });
        }
    }
    Ok(())
}

impl fmt::Display for MetricsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.request.fmt(f)
    }
}
