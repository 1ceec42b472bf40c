//! Conversion from `shimload_config::Config` to engine and logging settings.

use anyhow::{Context, Result};
use shimload_config::Config;
use shimload_core::{HttpFetcherConfig, RunOptions};
use shimload_telemetry::{LogConfig, LogFormat};
use url::Url;

/// Logging settings from the `[logging]` section.
pub(crate) fn to_log_config(config: &Config) -> LogConfig {
    let format = match config.logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        "full" => LogFormat::Full,
        _ => LogFormat::Compact,
    };
    config
        .logging
        .directives
        .iter()
        .fold(LogConfig::new(&config.logging.level).with_format(format), |lc, d| {
            lc.with_directive(d)
        })
}

/// Fetcher settings from the `[http]` section.
pub(crate) fn to_http_config(config: &Config) -> HttpFetcherConfig {
    HttpFetcherConfig {
        user_agent: config.http.user_agent.clone(),
        max_redirects: usize::try_from(config.http.max_redirects).unwrap_or(usize::MAX),
    }
}

/// The base URL, preferring `override_url` over the configured one.
pub(crate) fn base_url(config: &Config, override_url: Option<&str>) -> Result<Option<Url>> {
    override_url
        .or(config.orchestrator.base_url.as_deref())
        .map(|raw| Url::parse(raw).with_context(|| format!("invalid base URL '{raw}'")))
        .transpose()
}

/// Run options seeded from the `[orchestrator]` section.
pub(crate) fn default_options(config: &Config) -> RunOptions {
    let section = &config.orchestrator;
    let options = RunOptions::new()
        .with_analyze(section.analyze)
        .attach_as_resource(section.attach_as_resource);
    let options = section
        .always_load
        .iter()
        .fold(options, |o, name| o.always(name.clone()));
    section
        .never_load
        .iter()
        .fold(options, |o, name| o.never(name.clone()))
}
