mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

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
        "./config.toml",
        "./imagegate.toml",
        "~/.config/imagegate/config.toml",
        "/etc/imagegate/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if !config.server.route_prefix.starts_with('/') {
        anyhow::bail!(
            "Route prefix must start with '/': {:?}",
            config.server.route_prefix
        );
    }

    if config.origin.base_url.is_empty() {
        anyhow::bail!("Origin base URL is not configured");
    }

    if let Some(q) = config.transform.default_quality {
        if q == 0 || q > 100 {
            anyhow::bail!("Default quality must be in 1..=100, got {}", q);
        }
    }

    if let Some(ref smoke) = config.diagnostics.smoke_path {
        if !smoke.starts_with("/tmp/") {
            tracing::warn!("Smoke test path is not under /tmp/: {:?}", smoke);
        }
    }

    Ok(())
}
