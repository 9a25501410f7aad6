//! Error types for configuration loading and scraping.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading a metrics configuration.
///
/// All of these are fatal: a configuration either loads completely or not
/// at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read metrics config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not structurally valid YAML for the schema.
    #[error("Failed to parse metrics config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field failed validation.
    #[error("{location}: field `{field}` is invalid: {reason}")]
    Invalid {
        location: String,
        field: String,
        reason: String,
    },

    /// Keys that are not part of the schema were present.
    #[error("{location}: unknown fields: {}", .fields.join(", "))]
    UnknownFields {
        location: String,
        fields: Vec<String>,
    },

    /// A template failed to compile or render at load time.
    #[error("{location}: {source}")]
    Template {
        location: String,
        #[source]
        source: TemplateError,
    },

    /// Two metric descriptors are inconsistent with each other.
    #[error("Conflicting metric descriptors: {0}")]
    Registry(String),
}

impl ConfigError {
    /// Create a field validation error.
    pub fn invalid(
        location: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            location: location.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by template compilation and evaluation.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template parse failure: {source}; template was:\n{template}")]
    Compile {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed rendering template for values {values:?}: {source}")]
    Render {
        values: Vec<String>,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed parsing values {values:?}: {source}; intermediate yaml was:\n{rendered}")]
    Output {
        values: Vec<String>,
        rendered: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed parsing values {values:?}: unknown fields in result {index}: {}", .fields.join(", "))]
    UnknownFields {
        values: Vec<String>,
        index: usize,
        fields: Vec<String>,
    },

    #[error("failed parsing values {values:?}: label `{label}` in result {index} is not a scalar")]
    LabelValue {
        values: Vec<String>,
        index: usize,
        label: String,
    },
}

/// Errors raised by a directory client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("LDAP connection error: {0}")]
    Connection(String),

    #[error("LDAP search failed: {0}")]
    Search(String),
}

/// Errors raised while turning one source's search result into samples.
///
/// These are scoped to a single source and a single scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(
        "attribute {attribute} resulted in {count} values, but no translator was defined to convert this into labeled samples"
    )]
    ValueCount { attribute: String, count: usize },

    #[error("attribute {attribute}: value '{value}' is not an unsigned integer: {source}")]
    ParseCounter {
        attribute: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("attribute {attribute}: value '{value}' is not a number: {source}")]
    ParseGauge {
        attribute: String,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("attribute {attribute}: {source}")]
    Translation {
        attribute: String,
        #[source]
        source: TemplateError,
    },

    #[error("label {label} wasn't found in label sources {sources:?}")]
    MissingLabel {
        label: String,
        sources: Vec<Vec<String>>,
    },

    #[error("metric {metric} expects {expected} label values, got {actual}")]
    LabelCardinality {
        metric: String,
        expected: usize,
        actual: usize,
    },

    #[error("attribute {attribute} is a label type but has {} values: {values:?}", .values.len())]
    MultiValuedLabel {
        attribute: String,
        values: Vec<String>,
    },

    #[error(
        "required label attributes weren't found in entry '{dn}'; attribute->label mapping was {expected:?}, only built {found:?}"
    )]
    IncompleteLabels {
        dn: String,
        expected: Vec<(String, String)>,
        found: Vec<(String, String)>,
    },

    #[error("server sent an attribute that is not configured ({attribute})")]
    UnexpectedAttribute { attribute: String },

    #[error("metric {metric} has more than one sample with label values {label_values:?}")]
    DuplicateSeries {
        metric: String,
        label_values: Vec<String>,
    },
}
