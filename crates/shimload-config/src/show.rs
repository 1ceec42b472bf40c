//! Source-annotated display for `config show`.

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::merge::FieldSources;
use crate::types::Config;

/// A merged configuration plus where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Dotted field path to the layer that set it.
    pub field_sources: FieldSources,
    /// Files that were merged, lowest precedence first.
    pub loaded_files: Vec<String>,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with a source comment after each value.
    Toml,
    /// Plain JSON.
    Json,
}

#[derive(Serialize)]
struct JsonView<'a, T: Serialize> {
    config: &'a T,
    sources: &'a FieldSources,
    loaded_files: &'a [String],
}

impl ResolvedConfig {
    /// Render the configuration, or one top-level section of it.
    ///
    /// # Errors
    ///
    /// Returns [`fmt::Error`] if `section` does not exist or serialization
    /// fails.
    pub fn show(&self, format: ShowFormat, section: Option<&str>) -> Result<String, fmt::Error> {
        let value = self.section_value(section)?;
        match format {
            ShowFormat::Toml => self.show_toml(&value, section),
            ShowFormat::Json => {
                let view = JsonView {
                    config: &value,
                    sources: &self.field_sources,
                    loaded_files: &self.loaded_files,
                };
                serde_json::to_string_pretty(&view).map_err(|_| fmt::Error)
            },
        }
    }

    fn section_value(&self, section: Option<&str>) -> Result<toml::Value, fmt::Error> {
        let root = toml::Value::try_from(&self.config).map_err(|_| fmt::Error)?;
        match section {
            None => Ok(root),
            Some(name) => root.get(name).cloned().ok_or(fmt::Error),
        }
    }

    fn show_toml(&self, value: &toml::Value, section: Option<&str>) -> Result<String, fmt::Error> {
        let body = toml::to_string_pretty(value).map_err(|_| fmt::Error)?;

        let mut output = String::from("# Resolved shimload configuration\n");
        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (lowest precedence first):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        // Lines under a `[table]` header belong to that table.
        let mut table = section.unwrap_or_default().to_owned();
        for line in body.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                table = match section {
                    Some(outer) => format!("{outer}.{header}"),
                    None => header.to_owned(),
                };
                writeln!(output, "{line}")?;
                continue;
            }
            match self.annotation(trimmed, &table) {
                Some(tag) => writeln!(output, "{line}  # [{tag}]")?,
                None => writeln!(output, "{line}")?,
            }
        }
        Ok(output)
    }

    fn annotation(&self, line: &str, table: &str) -> Option<&'static str> {
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let key = line.split('=').next()?.trim();
        let path = if table.is_empty() {
            key.to_owned()
        } else {
            format!("{table}.{key}")
        };
        self.field_sources.get(&path).map(|layer| layer.tag())
    }
}
