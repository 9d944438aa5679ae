//! YAML config files

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Parse a config file; `Ok(None)` when there is no file yet
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid YAML in {:?}", path))?;
    Ok(Some(config))
}

/// Load a config, never failing
///
/// A missing file yields the defaults silently; an unreadable or invalid one
/// yields the defaults with a warning.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("Config loaded from {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("No config at {:?}, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("{:#}; using defaults", e);
            T::default()
        }
    }
}

/// Write a config as YAML, creating parent directories as needed
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {:?}", dir))?;
    }
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
    log::info!("Config saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/padbank/engine.yaml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_roundtrip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.yaml");

        let config = EngineConfig {
            max_voices: 48,
            one_shot_by_default: false,
            ..EngineConfig::default()
        };
        save_config(&config, &path).unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "max_voices: [not, a, number").unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded, EngineConfig::default());
        assert!(read_config::<EngineConfig>(&path).is_err());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<EngineConfig> = read_config(&dir.path().join("none.yaml")).unwrap();
        assert!(missing.is_none());
    }
}
