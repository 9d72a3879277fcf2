use std::collections::HashMap;
use std::env;
use std::sync::LazyLock;

use common::EnvEntry;
use regex::{Captures, Regex};
use tracing::warn;

use crate::config::RECURSION_LIMIT;

/// `{$NAME}` inside an env value.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\$([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Give every entry a literal value: missing values are copied from our own
/// environment, then `{$NAME}` placeholders are expanded.
pub fn resolve_env(entries: &[EnvEntry]) -> Vec<EnvEntry> {
    let values: HashMap<&str, String> = entries
        .iter()
        .map(|e| {
            let value = match &e.value {
                Some(value) => value.clone(),
                None => env::var(&e.name).unwrap_or_default(),
            };
            (e.name.as_str(), value)
        })
        .collect();

    entries
        .iter()
        .map(|e| {
            let raw = values.get(e.name.as_str()).map(String::as_str).unwrap_or_default();
            EnvEntry::literal(e.name.clone(), expand(raw, &values, 0))
        })
        .collect()
}

/// Replace placeholders from `lookup`, falling back to the process environment.
/// Substituted text is expanded again, up to the recursion limit.
pub fn expand(value: &str, lookup: &HashMap<&str, String>, depth: usize) -> String {
    if depth > RECURSION_LIMIT {
        warn!("recursion limit ({RECURSION_LIMIT}) reached at '{value}'");
        return value.to_string();
    }
    PLACEHOLDER
        .replace_all(value, |caps: &Captures| {
            let name = &caps[1];
            let raw = match lookup.get(name) {
                Some(value) => value.clone(),
                None => env::var(name).unwrap_or_default(),
            };
            expand(&raw, lookup, depth + 1)
        })
        .into_owned()
}
