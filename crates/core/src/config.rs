use crate::planner::{RenameOptions, DEFAULT_DIGITS, DEFAULT_SIDECAR_EXTENSION};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub prefix: String,
    pub digits: usize,
    pub skip_sidecar: bool,
    pub keep_case: bool,
    pub sidecar_extension: String,
    pub strict: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            digits: DEFAULT_DIGITS,
            skip_sidecar: false,
            keep_case: false,
            sidecar_extension: DEFAULT_SIDECAR_EXTENSION.to_string(),
            strict: false,
        }
    }
}

impl AppConfig {
    pub fn rename_options(&self) -> RenameOptions {
        RenameOptions {
            prefix: self.prefix.clone(),
            digits: self.digits,
            sidecars: !self.skip_sidecar,
            keep_case: self.keep_case,
            sidecar_extension: self.sidecar_extension.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("se", "lumens", "photoseq")
        .context("could not determine the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read config file: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("could not parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create config directory: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("could not serialize config")?;
    fs::write(path, body)
        .with_context(|| format!("could not write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config_from, save_config_to, AppConfig};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("config.toml")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.digits, 4);
        assert!(config.rename_options().sidecars);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "prefix = \"img_\"\nskip_sidecar = true\n").expect("write config");

        let config = load_config_from(&path).expect("parse");
        assert_eq!(config.prefix, "img_");
        assert_eq!(config.digits, 4);
        let options = config.rename_options();
        assert!(!options.sidecars);
        assert_eq!(options.sidecar_extension, "xmp");
    }

    #[test]
    fn zero_digits_disable_padding() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "digits = 0\n").expect("write config");

        let config = load_config_from(&path).expect("zero digits load");
        assert_eq!(config.rename_options().digits, 0);
    }

    #[test]
    fn saved_config_round_trips() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let config = AppConfig {
            prefix: "trip_".to_string(),
            digits: 3,
            strict: true,
            ..AppConfig::default()
        };

        save_config_to(&path, &config).expect("save");
        assert_eq!(load_config_from(&path).expect("load"), config);
    }
}
