//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge the user file (`~/.shimload/config.toml`, or
//!    `$SHIMLOAD_HOME/config.toml` when set)
//! 3. Merge `{workspace}/.shimload/config.toml`
//! 4. Apply `SHIMLOAD_*` variables to fields no file set
//! 5. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{HOME_VAR, apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Files larger than this are rejected unread.
const MAX_CONFIG_FILE_SIZE: usize = 256 * 1024;

/// Where the loader looks for files.
#[derive(Debug, Clone, Default)]
pub struct SearchPaths {
    /// Directory holding the user `config.toml`. `None` skips the layer.
    pub user_dir: Option<PathBuf>,
    /// Project root; its `.shimload/config.toml` is the workspace layer.
    pub workspace_root: Option<PathBuf>,
}

impl SearchPaths {
    /// Standard discovery: `$SHIMLOAD_HOME`, else `~/.shimload`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] if neither is available.
    pub fn discover<S: std::hash::BuildHasher>(
        workspace_root: Option<&Path>,
        env_vars: &HashMap<String, String, S>,
    ) -> ConfigResult<Self> {
        let user_dir = match env_vars.get(HOME_VAR).filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => directories::BaseDirs::new()
                .map(|d| d.home_dir().join(".shimload"))
                .ok_or(ConfigError::NoHomeDir)?,
        };
        Ok(Self {
            user_dir: Some(user_dir),
            workspace_root: workspace_root.map(Path::to_path_buf),
        })
    }

    /// User config file, if the layer is enabled.
    #[must_use]
    pub fn user_file(&self) -> Option<PathBuf> {
        self.user_dir.as_ref().map(|d| d.join("config.toml"))
    }

    /// Workspace config file, if a workspace is set.
    #[must_use]
    pub fn workspace_file(&self) -> Option<PathBuf> {
        self.workspace_root
            .as_ref()
            .map(|root| root.join(".shimload").join("config.toml"))
    }
}

/// Load with standard discovery and the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable or malformed, or the
/// merged configuration fails validation.
pub fn load(workspace_root: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();
    let paths = SearchPaths::discover(workspace_root, &env_vars)?;
    load_from(&paths, &env_vars)
}

/// Load from explicit search paths and environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_from<S: std::hash::BuildHasher>(
    paths: &SearchPaths,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged = parse(DEFAULTS_TOML, "<embedded defaults>")?;
    let mut field_sources = FieldSources::new();
    record_leaves(&merged, "", ConfigLayer::Defaults, &mut field_sources);

    let mut loaded_files = Vec::new();
    let layers = [
        (paths.user_file(), ConfigLayer::User),
        (paths.workspace_file(), ConfigLayer::Workspace),
    ];
    for (path, layer) in layers {
        let Some(path) = path else { continue };
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", layer, &mut field_sources);
            info!(path = %path.display(), layer = layer.tag(), "Loaded config file");
            loaded_files.push(path.display().to_string());
        }
    }

    let applied = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if applied > 0 {
        debug!(count = applied, "Applied environment variables");
    }

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a single file on top of the defaults, with no other layers.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is missing, unreadable, malformed,
/// or invalid.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;

    let mut merged = parse(DEFAULTS_TOML, "<embedded defaults>")?;
    let mut sources = FieldSources::new();
    deep_merge_tracking(&mut merged, &overlay, "", ConfigLayer::User, &mut sources);

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse(content: &str, origin: &str) -> ConfigResult<toml::Value> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_owned(),
        source: e,
    })
}

/// `None` if the file does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::invalid(
            path.display().to_string(),
            format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        ));
    }

    parse(&content, &path.display().to_string()).map(Some)
}
