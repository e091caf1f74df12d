//! Config command handlers.

use anyhow::{Context, Result};
use hextok_core::config;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set_api_base(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        anyhow::bail!("API base URL cannot be empty");
    }
    config::Config::save_api_base(url).context("save api_base")?;
    println!("Saved api_base = {} to {}", url.trim_end_matches('/'), config::paths::config_path().display());
    Ok(())
}
