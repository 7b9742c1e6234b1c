use std::path::PathBuf;

/// Default state root: `~/.config/container-use`, overridable by `EngineConfig::state_root`.
pub fn default_state_root() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("container-use"))
}
