//! User supplied templates for metric names and value translation.
//!
//! Templates use MiniJinja syntax with the contrib helper library and
//! Python-style string methods (`value.split(",")`, `value.startswith(...)`).
//! Undefined variables are always an error.
//!
//! A translator receives `values` (every raw value of the attribute) and
//! `value` (the first one) and must render a YAML list of results:
//!
//! ```yaml
//! - value: 2
//!   labels: {status: ok}
//! - value: 5
//!   labels: {status: fail}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use minijinja::{Environment, UndefinedBehavior, Value, context};
use serde::Deserialize;

use crate::error::TemplateError;

const TEMPLATE_NAME: &str = "config supplied template";

/// Default naming template for gauges.
pub const DEFAULT_GAUGE_NAME_TEMPLATE: &str = "{{ section }}_{{ attribute }}";

/// Default naming template for counters.
pub const DEFAULT_COUNTER_NAME_TEMPLATE: &str = "{{ section }}_{{ attribute }}_total";

/// A compiled template.
pub struct Template {
    source: String,
    env: Environment<'static>,
}

impl Template {
    /// Compile a template, failing on syntax errors.
    pub fn compile(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        minijinja_contrib::add_to_environment(&mut env);

        env.add_template_owned(TEMPLATE_NAME, source.clone())
            .map_err(|e| TemplateError::Compile {
                template: source.clone(),
                source: e,
            })?;

        Ok(Self { source, env })
    }

    /// The template text as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render a metric name for `attribute` in config section `section`.
    pub fn render_name(&self, section: &str, attribute: &str) -> Result<String, TemplateError> {
        self.render(context! { section => section, attribute => attribute })
            .map_err(|e| TemplateError::Render {
                values: vec![section.to_string(), attribute.to_string()],
                source: e,
            })
    }

    /// Evaluate this template as a translator over an attribute's values.
    pub fn translate(&self, values: &[String]) -> Result<Vec<Translation>, TemplateError> {
        let mut ctx: BTreeMap<&str, Value> = BTreeMap::new();
        ctx.insert("values", Value::from(values.to_vec()));
        if let Some(first) = values.first() {
            ctx.insert("value", Value::from(first.as_str()));
        }

        let rendered = self.render(ctx).map_err(|e| TemplateError::Render {
            values: values.to_vec(),
            source: e,
        })?;

        parse_translations(values, &rendered)
    }

    fn render<S: serde::Serialize>(&self, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(TEMPLATE_NAME)?.render(ctx)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.source).finish()
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One result of a translation: a sample value and the labels it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub value: f64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawTranslation {
    value: f64,
    #[serde(default)]
    labels: BTreeMap<String, serde_yaml::Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

fn parse_translations(values: &[String], rendered: &str) -> Result<Vec<Translation>, TemplateError> {
    // A template that renders nothing produces no samples.
    if rendered.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<RawTranslation> =
        serde_yaml::from_str(rendered).map_err(|e| TemplateError::Output {
            values: values.to_vec(),
            rendered: rendered.to_string(),
            source: e,
        })?;

    raw.into_iter()
        .enumerate()
        .map(|(index, result)| {
            if !result.extra.is_empty() {
                return Err(TemplateError::UnknownFields {
                    values: values.to_vec(),
                    index,
                    fields: result.extra.into_keys().collect(),
                });
            }

            let labels = result
                .labels
                .into_iter()
                .map(|(label, value)| match scalar_to_string(&value) {
                    Some(text) => Ok((label, text)),
                    None => Err(TemplateError::LabelValue {
                        values: values.to_vec(),
                        index,
                        label,
                    }),
                })
                .collect::<Result<_, _>>()?;

            Ok(Translation {
                value: result.value,
                labels,
            })
        })
        .collect()
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_name_templates() {
        let gauge = Template::compile(DEFAULT_GAUGE_NAME_TEMPLATE).unwrap();
        let counter = Template::compile(DEFAULT_COUNTER_NAME_TEMPLATE).unwrap();

        assert_eq!(gauge.render_name("monitor", "threads").unwrap(), "monitor_threads");
        assert_eq!(
            counter.render_name("snmp", "readops").unwrap(),
            "snmp_readops_total"
        );
    }

    #[test]
    fn test_compile_error_includes_template() {
        let err = Template::compile("{{ value").unwrap_err();
        assert!(matches!(err, TemplateError::Compile { .. }));
        assert!(err.to_string().contains("{{ value"));
    }

    #[test]
    fn test_translate_two_results_in_order() {
        let template =
            Template::compile("[{value: 2, labels: {status: ok}}, {value: 5, labels: {status: fail}}]")
                .unwrap();

        let results = template.translate(&values(&["ignored"])).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value, 2.0);
        assert_eq!(results[0].labels.get("status").map(String::as_str), Some("ok"));
        assert_eq!(results[1].value, 5.0);
        assert_eq!(results[1].labels.get("status").map(String::as_str), Some("fail"));
    }

    #[test]
    fn test_translate_fans_out_over_values() {
        let template = Template::compile(
            "[{% for v in values %}{value: 1, labels: {state: \"{{ v | lower }}\"}}{% if not loop.last %}, {% endif %}{% endfor %}]",
        )
        .unwrap();

        let results = template.translate(&values(&["UP", "Down"])).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].labels["state"], "up");
        assert_eq!(results[1].labels["state"], "down");
    }

    #[test]
    fn test_translate_decomposes_composite_value() {
        // "2:5" -> ok=2, fail=5
        let template = Template::compile(
            "{% set parts = value.split(\":\") %}\n- value: {{ parts[0] }}\n  labels: {status: ok}\n- value: {{ parts[1] }}\n  labels: {status: fail}\n",
        )
        .unwrap();

        let results = template.translate(&values(&["2:5"])).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value, 2.0);
        assert_eq!(results[1].value, 5.0);
    }

    #[test]
    fn test_undefined_reference_is_an_error() {
        let template = Template::compile("[{value: {{ missing }}}]").unwrap();

        let err = template.translate(&values(&["1"])).unwrap_err();

        assert!(matches!(err, TemplateError::Render { .. }));
        assert!(err.to_string().contains("undefined"));
    }

    #[test]
    fn test_name_template_undefined_reference_is_an_error() {
        let template = Template::compile("{{ section }}_{{ attr }}").unwrap();
        assert!(template.render_name("s", "a").is_err());
    }

    #[test]
    fn test_unparseable_output_includes_rendered_text() {
        let template = Template::compile("not: [valid").unwrap();

        let err = template.translate(&values(&["1"])).unwrap_err();

        assert!(matches!(err, TemplateError::Output { .. }));
        assert!(err.to_string().contains("not: [valid"));
    }

    #[test]
    fn test_unknown_result_field_is_rejected() {
        let template = Template::compile("[{value: 1, labels: {}, colour: red}]").unwrap();

        let err = template.translate(&values(&["1"])).unwrap_err();

        match err {
            TemplateError::UnknownFields { index, fields, .. } => {
                assert_eq!(index, 0);
                assert_eq!(fields, vec!["colour"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scalar_label_values_are_stringified() {
        let template = Template::compile("[{value: 1, labels: {code: 200, enabled: true}}]").unwrap();

        let results = template.translate(&values(&["x"])).unwrap();

        assert_eq!(results[0].labels["code"], "200");
        assert_eq!(results[0].labels["enabled"], "true");
    }

    #[test]
    fn test_nested_label_value_is_rejected() {
        let template = Template::compile("[{value: 1, labels: {code: [1, 2]}}]").unwrap();

        let err = template.translate(&values(&["x"])).unwrap_err();
        assert!(matches!(err, TemplateError::LabelValue { .. }));
    }

    #[test]
    fn test_empty_render_yields_no_results() {
        let template = Template::compile("{% if value == \"0\" %}[{value: 0}]{% endif %}").unwrap();

        assert!(template.translate(&values(&["1"])).unwrap().is_empty());
        assert_eq!(template.translate(&values(&["0"])).unwrap().len(), 1);
    }

    #[test]
    fn test_no_values_leaves_value_undefined() {
        let uses_values = Template::compile("[{value: {{ values | length }}}]").unwrap();
        let uses_value = Template::compile("[{value: {{ value }}}]").unwrap();

        assert_eq!(uses_values.translate(&[]).unwrap()[0].value, 0.0);
        assert!(uses_value.translate(&[]).is_err());
    }
}
