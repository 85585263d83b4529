//! Template values.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::TemplateResult;

/// Parse a YAML values document. An empty document yields an empty map;
/// with a `prefix` the values are nested under that key.
pub fn parse_values(text: &str, prefix: Option<&str>) -> TemplateResult<Value> {
    let parsed: Value = if text.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_yaml::from_str(text)? {
            Value::Null => Value::Object(Map::new()),
            other => other,
        }
    };

    Ok(match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => {
            let mut wrapped = Map::new();
            wrapped.insert(prefix.to_string(), parsed);
            Value::Object(wrapped)
        }
        None => parsed,
    })
}

/// Load values from an optional file followed by optional piped input.
///
/// The two are concatenated into one YAML document before parsing, so
/// piped keys extend (or repeat) the file's.
pub fn load_values(
    path: Option<&Path>,
    piped: Option<&str>,
    prefix: Option<&str>,
) -> TemplateResult<Value> {
    let mut text = String::new();
    if let Some(path) = path {
        debug!(path = ?path, "Reading values file");
        text = fs::read_to_string(path)?;
    }
    if let Some(piped) = piped {
        text.push('\n');
        text.push_str(piped);
    }
    parse_values(&text, prefix)
}
