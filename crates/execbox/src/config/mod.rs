use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    INPUT_FILE_NAME, Invocation, Language, LanguageProfile, SANDBOX_WORKDIR, UnsupportedLanguage,
};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../execbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// When sandbox images are made available on the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePolicy {
    /// Pull an image the first time a sandbox needs it
    #[default]
    IfMissing,

    /// Pull every registry image at startup
    Prefetch,

    /// Never pull; a missing image is a sandbox error
    Never,
}

/// Config for execbox
///
/// Operator-level settings only. Resource ceilings and the wall-clock
/// deadline are fixed policy (see [`crate::types::SandboxLimits`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Docker engine socket (uses `DOCKER_HOST` / platform default if not specified).
    #[serde(default)]
    pub docker_socket: Option<PathBuf>,

    /// Timeout in seconds for individual engine API requests.
    #[serde(default = "default_docker_timeout")]
    pub docker_timeout: u64,

    /// Directory under which per-execution workspaces are staged.
    ///
    /// Must be visible to the Docker daemon at the same path, since it is
    /// bind-mounted into each sandbox. Defaults to the system temp dir.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// When sandbox images are pulled.
    #[serde(default)]
    pub image_policy: ImagePolicy,
}

impl Config {
    /// Create a new config from the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the directory workspaces are staged under
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_docker_timeout() -> u64 {
    120
}
