//! Configuration types.
//!
//! These mirror the settings of the orchestrator, fetcher, and logger without
//! depending on the crates that implement them; the CLI converts them at
//! startup. Every section implements [`Default`] with the same values as the
//! embedded `defaults.toml`, so a bare `[section]` header is always valid.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Orchestrator defaults applied to every run.
    pub orchestrator: OrchestratorSection,
    /// HTTP fetcher settings.
    pub http: HttpSection,
    /// Log level, format, and directives.
    pub logging: LoggingSection,
    /// Description of the host used for offline planning.
    pub environment: EnvironmentSection,
}

/// Orchestrator defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorSection {
    /// Base URL that relative capability and payload locators resolve
    /// against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Capabilities loaded before any payload is fetched.
    pub bootstrap: Vec<String>,
    /// Whether payload text is scanned for capability usage.
    pub analyze: bool,
    /// Re-inject payloads instead of evaluating their text.
    pub attach_as_resource: bool,
    /// Capabilities always loaded when the host lacks them.
    pub always_load: Vec<String>,
    /// Capabilities never loaded on the strength of analysis.
    pub never_load: Vec<String>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            base_url: None,
            bootstrap: ["xmlHttpRequest", "arrayIndexOf", "isArray", "typeOf"]
                .map(String::from)
                .to_vec(),
            analyze: true,
            attach_as_resource: false,
            always_load: Vec::new(),
            never_load: Vec::new(),
        }
    }
}

/// HTTP fetcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    /// `User-Agent` header.
    pub user_agent: String,
    /// Redirects followed per request; zero disables redirects.
    pub max_redirects: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            user_agent: "shimload".to_owned(),
            max_redirects: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Level filter: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// `pretty`, `compact`, `json`, or `full`.
    pub format: String,
    /// Extra directives, e.g. `["shimload_core=debug"]`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

/// The host profile used by `shimload plan`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentSection {
    /// Global paths the host provides natively, e.g. `JSON` or
    /// `Array.prototype.indexOf`.
    pub globals: Vec<String>,
}
