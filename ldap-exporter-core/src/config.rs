//! Metrics configuration loading.
//!
//! The metrics configuration is a YAML list of sources:
//!
//! ```yaml
//! - name: snmp
//!   search: cn=snmp,cn=monitor
//!   scope: base
//!   attributes:
//!     labels:
//!       cn: instance
//!     metrics:
//!       readops:
//!         type: counter
//!         help: Read operations served
//!   labels:
//!     server: primary
//! ```
//!
//! Loading is two-phase: the document is deserialized into raw structs that
//! keep unknown keys aside, then every source is validated and built. Any
//! problem fails the whole load.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::directory::{DerefAliases, MATCH_ALL_FILTER, Scope};
use crate::error::{ConfigError, Result};
use crate::metric::{
    DEFAULT_HELP, MetricAttribute, MetricDesc, MetricKind, NAMESPACE, is_valid_label_name,
    is_valid_metric_name,
};
use crate::source::MetricsSource;
use crate::syntax::{validate_dn, validate_filter};
use crate::template::{DEFAULT_COUNTER_NAME_TEMPLATE, DEFAULT_GAUGE_NAME_TEMPLATE, Template};

type UnknownKeys = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    name: String,
    search: Option<String>,
    filter: Option<String>,
    scope: Option<String>,
    deref: Option<String>,
    counter_metric_name_template: Option<String>,
    gauge_metric_name_template: Option<String>,
    #[serde(default)]
    attributes: RawAttributes,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(flatten)]
    extra: UnknownKeys,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttributes {
    /// LDAP attribute -> label name.
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    metrics: BTreeMap<String, RawMetric>,
    #[serde(flatten)]
    extra: UnknownKeys,
}

#[derive(Debug, Deserialize)]
struct RawMetric {
    metric_name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    translator: Option<String>,
    help: Option<String>,
    #[serde(flatten)]
    extra: UnknownKeys,
}

/// Load a metrics configuration from YAML text.
///
/// An empty document yields no sources.
pub fn load_config(data: &str) -> Result<Vec<MetricsSource>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Option<Vec<RawSource>> = serde_yaml::from_str(data)?;

    raw.unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, source)| build_source(index, source))
        .collect()
}

/// Load a metrics configuration from a YAML file.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<Vec<MetricsSource>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), "Loading metrics config");
    load_config(&data)
}

fn check_unknown_fields(extra: &UnknownKeys, location: &str) -> Result<()> {
    if extra.is_empty() {
        return Ok(());
    }
    Err(ConfigError::UnknownFields {
        location: location.to_string(),
        fields: extra.keys().cloned().collect(),
    })
}

fn is_blank_or_spaced(text: &str) -> bool {
    text.is_empty() || text.chars().any(char::is_whitespace)
}

fn compile_name_template(
    configured: Option<String>,
    default: &str,
    location: &str,
    field: &str,
) -> Result<Template> {
    let source = configured
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    Template::compile(source).map_err(|e| ConfigError::Template {
        location: format!("{location}.{field}"),
        source: e,
    })
}

/// Per-source settings shared by every metric attribute of the source.
struct SourceContext<'a> {
    name: &'a str,
    location: &'a str,
    counter_template: &'a Template,
    gauge_template: &'a Template,
    label_names: &'a [String],
    const_labels: &'a BTreeMap<String, String>,
}

fn build_source(index: usize, raw: RawSource) -> Result<MetricsSource> {
    let RawSource {
        name,
        search,
        filter,
        scope,
        deref,
        counter_metric_name_template,
        gauge_metric_name_template,
        attributes,
        labels: const_labels,
        extra,
    } = raw;

    let location = if name.is_empty() {
        format!("sources[{index}]")
    } else {
        format!("sources[{index}] ({name})")
    };

    check_unknown_fields(&extra, &location)?;
    check_unknown_fields(&attributes.extra, &format!("{location}.attributes"))?;

    // An empty base is the root DSE.
    let search = search
        .ok_or_else(|| ConfigError::invalid(&location, "search", "search is undefined"))?;
    validate_dn(&search).map_err(|e| {
        ConfigError::invalid(&location, "search", format!("search '{search}' is malformed: {e}"))
    })?;

    let filter = filter.unwrap_or_else(|| MATCH_ALL_FILTER.to_string());
    validate_filter(&filter).map_err(|e| {
        ConfigError::invalid(&location, "filter", format!("filter '{filter}' is malformed: {e}"))
    })?;

    let scope = match scope {
        None => Scope::default(),
        Some(choice) => Scope::parse(&choice).ok_or_else(|| {
            ConfigError::invalid(
                &location,
                "scope",
                format!("scope '{choice}' is not one of base, single or subtree"),
            )
        })?,
    };

    let deref = match deref {
        None => DerefAliases::default(),
        Some(choice) => DerefAliases::parse(&choice).ok_or_else(|| {
            ConfigError::invalid(
                &location,
                "deref",
                format!("deref '{choice}' is not one of never, search, base or always"),
            )
        })?,
    };

    let counter_template = compile_name_template(
        counter_metric_name_template,
        DEFAULT_COUNTER_NAME_TEMPLATE,
        &location,
        "counter_metric_name_template",
    )?;
    let gauge_template = compile_name_template(
        gauge_metric_name_template,
        DEFAULT_GAUGE_NAME_TEMPLATE,
        &location,
        "gauge_metric_name_template",
    )?;

    for (key, value) in &const_labels {
        if is_blank_or_spaced(key) || is_blank_or_spaced(value) {
            return Err(ConfigError::invalid(
                &location,
                "labels",
                format!("'{key}: {value}' cannot have whitespace and must be nonempty"),
            ));
        }
        if !is_valid_label_name(key) {
            return Err(ConfigError::invalid(
                &location,
                "labels",
                format!("'{key}' is not a valid label name"),
            ));
        }
    }

    let mut label_names: Vec<String> = Vec::new();
    for (attribute, label) in &attributes.labels {
        let field = format!("attributes.labels.{attribute}");
        if is_blank_or_spaced(attribute) || is_blank_or_spaced(label) {
            return Err(ConfigError::invalid(
                &location,
                field,
                format!("'{attribute}: {label}' cannot have whitespace and must be nonempty"),
            ));
        }
        if !is_valid_label_name(label) {
            return Err(ConfigError::invalid(
                &location,
                field,
                format!("'{label}' is not a valid label name"),
            ));
        }
        if label_names.contains(label) || const_labels.contains_key(label) {
            return Err(ConfigError::invalid(
                &location,
                field,
                format!("duplicate label names found for {attribute}->{label}; '{label}' already is a label"),
            ));
        }
        label_names.push(label.clone());
    }

    let ctx = SourceContext {
        name: &name,
        location: &location,
        counter_template: &counter_template,
        gauge_template: &gauge_template,
        label_names: &label_names,
        const_labels: &const_labels,
    };

    let mut metric_attributes = BTreeMap::new();
    for (attribute, metric) in attributes.metrics {
        let built = build_metric_attribute(&ctx, &attribute, metric)?;
        metric_attributes.insert(attribute, built);
    }

    let source = MetricsSource::new(
        name,
        search,
        filter,
        scope,
        deref,
        metric_attributes,
        attributes.labels,
    );
    debug!(source = %source, "Loaded metrics source");
    Ok(source)
}

fn build_metric_attribute(
    ctx: &SourceContext<'_>,
    attribute: &str,
    raw: RawMetric,
) -> Result<MetricAttribute> {
    let location = format!("{}.attributes.metrics.{attribute}", ctx.location);
    check_unknown_fields(&raw.extra, &location)?;

    let kind = match raw.kind.as_deref() {
        None | Some("") => {
            return Err(ConfigError::invalid(&location, "type", "type must be defined"));
        }
        Some(kind) => MetricKind::parse(kind).ok_or_else(|| {
            ConfigError::invalid(
                &location,
                "type",
                format!("type '{kind}' isn't valid; supported types are 'counter' and 'gauge'"),
            )
        })?,
    };

    for (idx, label) in raw.labels.iter().enumerate() {
        if is_blank_or_spaced(label) {
            return Err(ConfigError::invalid(
                &location,
                "labels",
                format!("label at index {idx} cannot have whitespace and must be nonempty: '{label}'"),
            ));
        }
    }

    let help = match raw.help.filter(|h| !h.trim().is_empty()) {
        Some(help) => help,
        None => {
            warn!(section = ctx.name, attribute, "No help provided");
            DEFAULT_HELP.to_string()
        }
    };

    let base_name = match raw.metric_name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => {
            let template = match kind {
                MetricKind::Counter => ctx.counter_template,
                MetricKind::Gauge => ctx.gauge_template,
            };
            template
                .render_name(ctx.name, attribute)
                .map_err(|e| ConfigError::Template {
                    location: format!("{location} (naming)"),
                    source: e,
                })?
        }
    };

    let name = format!("{NAMESPACE}_{base_name}");
    if !is_valid_metric_name(&name) {
        return Err(ConfigError::invalid(
            &location,
            "metric_name",
            format!("'{name}' is not a valid metric name"),
        ));
    }

    let translator = raw
        .translator
        .map(Template::compile)
        .transpose()
        .map_err(|e| ConfigError::Template {
            location: format!("{location}.translator"),
            source: e,
        })?;

    let mut label_names = ctx.label_names.to_vec();
    label_names.extend(raw.labels);

    let desc = MetricDesc::new(name, help, kind, label_names, ctx.const_labels.clone())
        .map_err(|reason| ConfigError::invalid(&location, "labels", reason))?;

    debug!(
        metric = %desc.name,
        kind = desc.kind.as_str(),
        translated = translator.is_some(),
        "Configured metric attribute"
    );

    Ok(MetricAttribute::new(desc, translator))
}
