//! Standard config locations

use std::path::PathBuf;

/// Per-user config directory
///
/// Returns: `<config_dir>/padbank` (e.g. `~/.config/padbank`), or `./padbank`
/// if the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("padbank")
}

/// Returns: `<config_dir>/padbank/engine.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("engine.yaml")
}
