//! Configuration file loading for execbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    ///
    /// `EXECBOX_*` environment variables (e.g., `EXECBOX_IMAGE_POLICY`)
    /// override values from the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("EXECBOX").try_parsing(true))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.docker_timeout == 0 {
            return Err(ConfigError::Invalid(
                "docker_timeout must be at least one second".to_owned(),
            ));
        }
        if let Some(ref root) = self.workspace_root
            && !root.is_absolute()
        {
            return Err(ConfigError::Invalid(format!(
                "workspace_root '{}' must be an absolute path",
                root.display()
            )));
        }

        Ok(())
    }
}
