//! Placeholder substitution for notification messages and payloads

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Placeholder regex should compile - this is a static pattern")
});

/// Deprecated placeholder names kept for older server files
const ALIASES: &[(&str, &str)] = &[("droplet_name", "server_name"), ("droplet_id", "server_id")];

/// Values available to templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    values: BTreeMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Copy with `f` applied to every value
    pub fn map_values(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            values: self.values.iter().map(|(k, v)| (k.clone(), f(v))).collect(),
        }
    }

    /// Look up a placeholder, following deprecated aliases
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, target)| *target)
            .unwrap_or(name);
        self.values.get(name).map(String::as_str)
    }
}

/// Substitute `{name}` placeholders in a single pass. Unknown placeholders
/// are left verbatim and substituted values are never re-expanded.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1])
                .map(str::to_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Render every string leaf of a JSON document; keys and non-string
/// values are kept as they are.
pub fn render_json(value: &Value, vars: &TemplateVars) -> Value {
    map_strings(value, &|s| render(s, vars))
}

/// Apply `f` to every string leaf, recursing through objects and arrays
pub fn map_strings(value: &Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), map_strings(v, f)))
                .collect(),
        ),
        other => other.clone(),
    }
}
