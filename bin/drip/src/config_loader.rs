use anyhow::{bail, Context, Result};
use drip_common::utils::config::load_config;
use drip_faucet::FaucetServiceConfig;
use std::path::{Path, PathBuf};

/// File (if given), then `DRIP_*` variables, then the `--data-dir` override.
pub fn load_service_config(path: Option<&Path>, data_dir_override: Option<PathBuf>) -> Result<FaucetServiceConfig> {
    let config = match path {
        Some(path) => load_config::<FaucetServiceConfig, _>(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FaucetServiceConfig::default(),
    };
    let mut config = config.with_env_overrides();

    if let Some(dd) = data_dir_override {
        config.db_path = dd.to_string_lossy().to_string();
    }

    Ok(config)
}

/// Write the default configuration as TOML. Refuses to overwrite.
pub fn write_default_config(out: &Path) -> Result<()> {
    if out.exists() {
        bail!("{} already exists", out.display());
    }
    let text = toml::to_string_pretty(&FaucetServiceConfig::default())?;
    std::fs::write(out, text).with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(())
}
