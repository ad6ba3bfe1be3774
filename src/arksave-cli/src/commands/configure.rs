//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting arksave CLI defaults.

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;

/// Handle the configure command
pub fn handle(export_dir: Option<PathBuf>, skip_invalid: Option<bool>, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if !apply(&mut config, export_dir, skip_invalid) {
        show_usage();
        return Ok(());
    }

    config.save()?;
    println!("Configuration updated");
    if let Ok(path) = Config::config_path() {
        println!("Config saved to: {}", path.display());
    }

    Ok(())
}

/// Apply the given settings, returning whether anything changed
fn apply(config: &mut Config, export_dir: Option<PathBuf>, skip_invalid: Option<bool>) -> bool {
    let mut changed = false;
    if let Some(dir) = export_dir {
        config.export_dir = Some(dir);
        changed = true;
    }
    if let Some(skip) = skip_invalid {
        config.skip_invalid = skip;
        changed = true;
    }
    changed
}

fn show_config(config: &Config) {
    match &config.export_dir {
        Some(dir) => println!("Export directory: {}", dir.display()),
        None => println!("Export directory: (next to input)"),
    }
    println!("Skip invalid: {}", config.skip_invalid);

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

fn show_usage() {
    println!("Usage: arksave configure --export-dir DIR");
    println!("   or: arksave configure --skip-invalid true|false");
    println!("   or: arksave configure --show");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_nothing() {
        let mut config = Config::default();
        assert!(!apply(&mut config, None, None));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_apply_settings() {
        let mut config = Config::default();
        assert!(apply(&mut config, Some(PathBuf::from("/tmp/out")), Some(true)));
        assert_eq!(config.export_dir, Some(PathBuf::from("/tmp/out")));
        assert!(config.skip_invalid);
    }
}
