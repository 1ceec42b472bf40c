//! Handlers for `shimload config`.

use anyhow::{Result, anyhow};
use shimload_config::{Config, SearchPaths, ShowFormat, env};

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(format: &str, section: Option<&str>) -> Result<()> {
    let workspace_root = std::env::current_dir().ok();
    let resolved = Config::load(workspace_root.as_deref())?;

    let show_format = match format {
        "json" => ShowFormat::Json,
        "toml" => ShowFormat::Toml,
        other => return Err(anyhow!("unknown format '{other}'; expected toml or json")),
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|_| anyhow!("failed to format config (unknown section?)"))?;
    println!("{output}");
    Ok(())
}

/// Validate the current configuration, exiting non-zero if it is invalid.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn validate_config() -> Result<()> {
    let workspace_root = std::env::current_dir().ok();

    match Config::load(workspace_root.as_deref()) {
        Ok(resolved) => {
            println!("{}", Theme::success("Configuration is valid."));
            if !resolved.loaded_files.is_empty() {
                println!("\nLoaded files:");
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            Ok(())
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
            std::process::exit(1);
        },
    }
}

/// List the config files and environment variables consulted.
pub(crate) fn show_paths() -> Result<()> {
    let workspace_root = std::env::current_dir().ok();
    let env_vars = env::collect_env_vars();
    let paths = SearchPaths::discover(workspace_root.as_deref(), &env_vars)?;

    println!("{}\n", Theme::header("Configuration files (lowest precedence first)"));
    let files = [paths.user_file(), paths.workspace_file()];
    for (i, path) in files.iter().flatten().enumerate() {
        let status = if path.exists() {
            Theme::success("found")
        } else {
            Theme::dimmed("not found")
        };
        println!("  {}. {}  [{status}]", i.saturating_add(1), path.display());
    }

    println!("\n{}", Theme::header("Environment variables (fill fields no file sets)"));
    for var in env::variable_names() {
        let marker = if env_vars.contains_key(var) {
            Theme::warning("set")
        } else {
            Theme::dimmed("unset")
        };
        println!("  {var}  [{marker}]");
    }
    Ok(())
}
