mod types;

pub use types::*;

use anyhow::{Context, Result};
use batchforge_common::paths::normalize_extension;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config.base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf);

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./batchforge.toml",
        "./config.toml",
        "~/.config/batchforge/config.toml",
        "/etc/batchforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    // Return default config if no file found
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// `PORT` overrides the configured server port.
fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port
            .trim()
            .parse()
            .with_context(|| format!("Invalid PORT environment variable: {port:?}"))?;
    }
    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let conversion = &config.conversion;
    if conversion.batch_size == 0 {
        anyhow::bail!("conversion.batch_size must be at least 1");
    }
    if conversion.input_dir.as_os_str().is_empty() {
        anyhow::bail!("conversion.input_dir cannot be empty");
    }
    if conversion.output_dir.as_os_str().is_empty() {
        anyhow::bail!("conversion.output_dir cannot be empty");
    }

    let source = normalize_extension(&conversion.source_extension);
    let target = normalize_extension(&conversion.target_extension);
    if source.is_empty() || target.is_empty() {
        anyhow::bail!("conversion.source_extension and conversion.target_extension must be set");
    }
    if source == target {
        anyhow::bail!("Source and target extensions are both '{}'", source);
    }

    if conversion.input_dir == conversion.output_dir {
        tracing::warn!(
            "Input and output directories are the same: {:?}",
            conversion.input_dir
        );
    }

    Ok(())
}
