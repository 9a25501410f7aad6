//! Prometheus text exposition format (version 0.0.4).

use std::collections::HashMap;
use std::fmt::Write;

use crate::metric::Sample;

/// Content type of [`render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus exposition format.
///
/// Samples are grouped into families by metric name; families appear in the
/// order their first sample does.
pub fn render(samples: &[Sample]) -> String {
    let mut families: Vec<(&str, Vec<&Sample>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for sample in samples {
        let name = sample.desc.name.as_str();
        match index.get(name) {
            Some(&idx) => families[idx].1.push(sample),
            None => {
                index.insert(name, families.len());
                families.push((name, vec![sample]));
            }
        }
    }

    let mut output = String::with_capacity(samples.len() * 100);

    for (name, series) in families {
        let desc = &series[0].desc;
        writeln!(output, "# HELP {} {}", name, escape_help(&desc.help)).ok();
        writeln!(output, "# TYPE {} {}", name, desc.kind.as_str()).ok();

        for sample in series {
            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(sample),
                format_value(sample.value)
            )
            .ok();
        }
    }

    output
}

fn format_labels(sample: &Sample) -> String {
    let pairs: Vec<String> = sample
        .desc
        .const_labels
        .iter()
        .chain(sample.desc.label_names.iter().zip(&sample.label_values))
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    if pairs.is_empty() {
        return String::new();
    }
    format!("{{{}}}", pairs.join(","))
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
