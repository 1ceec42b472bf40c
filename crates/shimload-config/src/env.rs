//! `SHIMLOAD_*` environment variables.
//!
//! Environment variables fill in fields that no config file set. A value
//! written in a user or workspace file always wins.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::{debug, warn};

use crate::merge::{ConfigLayer, FieldSources};

/// Points the user layer at `$SHIMLOAD_HOME/config.toml`.
pub const HOME_VAR: &str = "SHIMLOAD_HOME";

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Integer,
    Boolean,
    List,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "SHIMLOAD_BASE_URL",
        field_path: "orchestrator.base_url",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "SHIMLOAD_ANALYZE",
        field_path: "orchestrator.analyze",
        kind: Kind::Boolean,
    },
    EnvMapping {
        var_name: "SHIMLOAD_USER_AGENT",
        field_path: "http.user_agent",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "SHIMLOAD_MAX_REDIRECTS",
        field_path: "http.max_redirects",
        kind: Kind::Integer,
    },
    EnvMapping {
        var_name: "SHIMLOAD_LOG_LEVEL",
        field_path: "logging.level",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "SHIMLOAD_LOG_FORMAT",
        field_path: "logging.format",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "SHIMLOAD_GLOBALS",
        field_path: "environment.globals",
        kind: Kind::List,
    },
];

/// Names of every recognized variable, for `config paths`.
#[must_use]
pub fn variable_names() -> Vec<&'static str> {
    ENV_MAPPINGS.iter().map(|m| m.var_name).collect()
}

/// Apply variables to fields that are unset or only carry a default.
///
/// Returns the number of variables applied.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let from_file = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if from_file {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let Some(value) = coerce(mapping.kind, raw) else {
            warn!(var = mapping.var_name, value = %raw, "ignoring malformed environment variable");
            continue;
        };

        debug!(var = mapping.var_name, field = mapping.field_path, "applying env var fallback");
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    count
}

fn coerce(kind: Kind, raw: &str) -> Option<toml::Value> {
    match kind {
        Kind::Text => Some(toml::Value::String(raw.to_owned())),
        Kind::Integer => raw.trim().parse::<i64>().ok().map(toml::Value::Integer),
        Kind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Some(toml::Value::Boolean(false)),
            _ => None,
        },
        Kind::List => Some(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| toml::Value::String(item.to_owned()))
                .collect(),
        )),
    }
}

/// Insert `value` at a dotted path, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment)
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Snapshot of the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_env_overrides_defaults() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"\n").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Defaults);

        let applied = apply_env_fallbacks(
            &mut merged,
            &mut sources,
            &env(&[("SHIMLOAD_LOG_LEVEL", "debug"), ("SHIMLOAD_MAX_REDIRECTS", "3")]),
        );

        assert_eq!(applied, 2);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(merged["http"]["max_redirects"].as_integer(), Some(3));
        assert_eq!(sources["logging.level"], ConfigLayer::Environment);
    }

    #[test]
    fn test_file_value_wins() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"error\"\n").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Workspace);

        let applied = apply_env_fallbacks(
            &mut merged,
            &mut sources,
            &env(&[("SHIMLOAD_LOG_LEVEL", "trace")]),
        );

        assert_eq!(applied, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("error"));
    }

    #[test]
    fn test_list_and_bool_coercion() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        apply_env_fallbacks(
            &mut merged,
            &mut sources,
            &env(&[
                ("SHIMLOAD_GLOBALS", "JSON, Array.isArray,,"),
                ("SHIMLOAD_ANALYZE", "off"),
            ]),
        );

        let globals = merged["environment"]["globals"].as_array().unwrap();
        assert_eq!(globals.len(), 2);
        assert_eq!(globals[1].as_str(), Some("Array.isArray"));
        assert_eq!(merged["orchestrator"]["analyze"].as_bool(), Some(false));
    }

    #[test]
    fn test_malformed_value_ignored() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let applied = apply_env_fallbacks(
            &mut merged,
            &mut sources,
            &env(&[("SHIMLOAD_MAX_REDIRECTS", "many")]),
        );
        assert_eq!(applied, 0);
        assert!(!sources.contains_key("http.max_redirects"));
    }
}
