//! Validation of a fully merged [`Config`].

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const FORMATS: &[&str] = &["pretty", "compact", "json", "full"];
const MAX_REDIRECTS: u32 = 50;

/// Check every section.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_orchestrator(config)?;
    validate_http(config)?;
    validate_logging(config)?;
    validate_environment(config)
}

fn validate_orchestrator(config: &Config) -> ConfigResult<()> {
    let section = &config.orchestrator;

    if let Some(base) = &section.base_url {
        let parsed = url::Url::parse(base)
            .map_err(|e| ConfigError::invalid("orchestrator.base_url", format!("'{base}': {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::invalid(
                "orchestrator.base_url",
                format!("'{base}' cannot be used as a base URL"),
            ));
        }
    }

    names("orchestrator.bootstrap", &section.bootstrap, true)?;
    names("orchestrator.always_load", &section.always_load, false)?;
    names("orchestrator.never_load", &section.never_load, false)
}

/// Capability names must be non-blank and free of whitespace. `unique`
/// additionally rejects repeats.
fn names(field: &str, values: &[String], unique: bool) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in values {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                field,
                format!("'{name}' is not a valid capability name"),
            ));
        }
        if unique && !seen.insert(name.as_str()) {
            return Err(ConfigError::invalid(field, format!("'{name}' listed twice")));
        }
    }
    Ok(())
}

fn validate_http(config: &Config) -> ConfigResult<()> {
    if config.http.user_agent.trim().is_empty() {
        return Err(ConfigError::invalid("http.user_agent", "must not be empty"));
    }
    if config.http.max_redirects > MAX_REDIRECTS {
        return Err(ConfigError::invalid(
            "http.max_redirects",
            format!(
                "{} exceeds the limit of {MAX_REDIRECTS}",
                config.http.max_redirects
            ),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    if !LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                LEVELS.join(", ")
            ),
        ));
    }
    if !FORMATS.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                FORMATS.join(", ")
            ),
        ));
    }
    if let Some(bad) = config.logging.directives.iter().find(|d| d.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "logging.directives",
            format!("empty directive '{bad}'"),
        ));
    }
    Ok(())
}

fn validate_environment(config: &Config) -> ConfigResult<()> {
    for path in &config.environment.globals {
        let well_formed = !path.is_empty()
            && path
                .split('.')
                .all(|seg| !seg.is_empty() && !seg.chars().any(char::is_whitespace));
        if !well_formed {
            return Err(ConfigError::invalid(
                "environment.globals",
                format!("'{path}' is not a dotted global path"),
            ));
        }
    }
    Ok(())
}
