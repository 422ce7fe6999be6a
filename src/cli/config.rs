use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

fn config_file(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => AppConfig::get_config_path(),
    }
}

fn load(path: &Path) -> Result<AppConfig> {
    AppConfig::load_from(path)
}

/// Handle config get command
pub async fn handle_config_get(config_path: Option<PathBuf>, key: String) -> Result<()> {
    let config = load(&config_file(config_path)?)?;

    if let Some(value) = config.get(&key) {
        println!("{value}");
        Ok(())
    } else {
        anyhow::bail!("Config key '{key}' not found");
    }
}

/// Handle config set command
pub async fn handle_config_set(config_path: Option<PathBuf>, key: String, value: String) -> Result<()> {
    let path = config_file(config_path)?;
    let mut config = load(&path)?;

    config.set(&key, value)?;
    config.validate()?;
    config.save_to(&path)?;

    println!(
        "{} Config '{}' set successfully",
        style("✓").green(),
        style(&key).cyan()
    );
    println!("  Saved to: {}", style(path.display()).dim());

    Ok(())
}

/// Handle config unset command
pub async fn handle_config_unset(config_path: Option<PathBuf>, key: String) -> Result<()> {
    let path = config_file(config_path)?;
    let mut config = load(&path)?;

    config.unset(&key)?;
    config.save_to(&path)?;

    println!(
        "{} Config '{}' reset to default",
        style("✓").green(),
        style(&key).cyan()
    );

    Ok(())
}

/// Handle config list command
pub async fn handle_config_list(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_file(config_path)?;
    let config = load(&path)?;

    println!("{}", style("Configuration:").bold());
    println!();
    for (key, value) in config.list() {
        println!("  {} = {}", style(key).cyan(), style(value).dim());
    }
    println!();
    println!("  Config file: {}", style(path.display()).dim());

    Ok(())
}

/// Handle config path command
pub async fn handle_config_path(config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", config_file(config_path)?.display());
    Ok(())
}
