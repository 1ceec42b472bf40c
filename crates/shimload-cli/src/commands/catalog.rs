//! `shimload catalog`: the built-in capabilities against a host profile.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use shimload_config::Config;
use shimload_core::{CapabilityRegistry, DependencyRule, Host};

use crate::OutputFormat;
use crate::profile::ProfileHost;
use crate::theme::Theme;

#[derive(Debug, Serialize)]
struct CatalogEntry {
    name: String,
    locator: String,
    bootstrap: bool,
    needed: bool,
    requires: String,
}

fn entries(registry: &CapabilityRegistry, host: &dyn Host, bootstrap: &[String]) -> Vec<CatalogEntry> {
    registry
        .iter()
        .map(|descriptor| CatalogEntry {
            name: descriptor.name().to_string(),
            locator: descriptor.locator().to_string(),
            bootstrap: bootstrap.iter().any(|b| b == descriptor.name().as_str()),
            needed: descriptor.environment_needs(host),
            requires: match descriptor.dependency_rule() {
                DependencyRule::None => String::new(),
                DependencyRule::Fixed(names) => names
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                DependencyRule::Dynamic(_) => "computed".to_owned(),
            },
        })
        .collect()
}

/// Print the catalog in registry (activation) order.
pub(crate) fn show_catalog(config: &Config, globals: &[String], format: OutputFormat) -> Result<()> {
    let registry = shimload_core::catalog::builtin()?;
    let host = ProfileHost::new(config.environment.globals.iter().chain(globals).cloned());
    let entries = entries(&registry, &host, &config.orchestrator.bootstrap);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", Theme::header("Built-in capabilities (activation order)"));
    println!("{}", Theme::separator());
    for entry in &entries {
        let status = if entry.needed {
            format!("{:<8}", "needed").as_str().yellow()
        } else {
            format!("{:<8}", "native").as_str().green()
        };
        let mut line = format!("  {:<24} {status} {}", entry.name, entry.locator.dimmed());
        if entry.bootstrap {
            line.push_str(&format!(" {}", "[bootstrap]".cyan()));
        }
        if !entry.requires.is_empty() {
            line.push_str(&format!(" requires: {}", entry.requires));
        }
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_reflect_profile() {
        let registry = shimload_core::catalog::builtin().unwrap();
        let host = ProfileHost::new(["JSON"]);
        let bootstrap = vec!["isArray".to_owned()];
        let entries = entries(&registry, &host, &bootstrap);

        let json = entries.iter().find(|e| e.name == "JSON").unwrap();
        assert!(!json.needed);
        let is_array = entries.iter().find(|e| e.name == "isArray").unwrap();
        assert!(is_array.needed && is_array.bootstrap);
        let listener = entries.iter().find(|e| e.name == "addEventListener").unwrap();
        assert_eq!(listener.requires, "computed");
    }
}
