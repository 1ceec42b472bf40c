use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Which layer a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `~/.shimload/config.toml`, or `$SHIMLOAD_HOME/config.toml`.
    User,
    /// `{workspace}/.shimload/config.toml`.
    Workspace,
    /// A `SHIMLOAD_*` environment variable.
    Environment,
}

impl ConfigLayer {
    /// Short tag used in annotated output.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Defaults => "defaults",
            Self::User => "user",
            Self::Workspace => "workspace",
            Self::Environment => "env",
        }
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => f.write_str("defaults"),
            Self::User => f.write_str("user (~/.shimload/config.toml)"),
            Self::Workspace => f.write_str("workspace (.shimload/config.toml)"),
            Self::Environment => f.write_str("environment variable"),
        }
    }
}

/// Dotted field path to the layer that last set it.
pub type FieldSources = BTreeMap<String, ConfigLayer>;
