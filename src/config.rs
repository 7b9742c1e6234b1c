//! Layered TOML engine configuration, loaded the way the teacher layers its
//! own user config: a `config::Config` builder over an optional `File`
//! source, merged with hard-coded defaults, then deserialized into a typed
//! struct.

use std::path::PathBuf;

use config::{Config, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::path::default_state_root;

fn default_container_runtime() -> String {
    "auto".to_string()
}

fn default_op_binary() -> String {
    "op".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SecretsConfig {
    /// Override path to the `op` CLI used to resolve `op://` secrets.
    #[serde(default = "default_op_binary")]
    pub op_binary: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            op_binary: default_op_binary(),
        }
    }
}

/// `~/.config/container-use/config.toml`. Missing file or unknown keys both
/// fall back to defaults (forward-compatible); malformed TOML is a startup
/// error surfaced unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Override for `~/.config/container-use`. `None` means use the default.
    pub state_root: Option<PathBuf>,
    /// `"docker"` | `"podman"` | `"auto"`.
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Default level for `RUST_LOG` when not otherwise set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_root: None,
            container_runtime: default_container_runtime(),
            secrets: SecretsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load from `~/.config/container-use/config.toml`, falling back to
    /// defaults when the file is missing. An explicit path can be passed for
    /// tests.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_config_path();
        Self::load_from_path(path.as_deref())
    }

    pub fn load_from_path(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path
            && path.exists()
        {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config = builder.build()?;
        let engine_config: EngineConfig = config.try_deserialize()?;
        Ok(engine_config)
    }

    fn default_config_path() -> Option<PathBuf> {
        default_state_root().map(|root| root.join("config.toml"))
    }

    /// Resolved state root: `state_root` override, else the platform default.
    pub fn resolved_state_root(&self) -> Option<PathBuf> {
        self.state_root.clone().or_else(default_state_root)
    }
}
