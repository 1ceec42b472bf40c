#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Layered configuration for shimload.
//!
//! # Usage
//!
//! ```rust,no_run
//! use shimload_config::Config;
//!
//! let resolved = Config::load(Some(std::path::Path::new("."))).unwrap();
//! println!("bootstrap: {:?}", resolved.config.orchestrator.bootstrap);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest:
//!
//! 1. **Workspace** (`{workspace}/.shimload/config.toml`)
//! 2. **User** (`~/.shimload/config.toml`, or `$SHIMLOAD_HOME/config.toml`)
//! 3. **Environment** (`SHIMLOAD_*`), only for fields no file set
//! 4. **Embedded defaults** (`defaults.toml`)
//!
//! This crate does not depend on the engine crates. The CLI converts these
//! types into orchestrator, fetcher, and logging settings.

/// `SHIMLOAD_*` environment variables.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Layered TOML merging with source tracking.
pub mod merge;
/// Annotated display.
pub mod show;
/// Configuration structs.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::SearchPaths;
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any file is malformed or the merged
    /// configuration is invalid.
    pub fn load(workspace_root: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root)
    }

    /// Check this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
