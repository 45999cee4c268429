//! Configuration loader.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
///
/// `${VAR}` is replaced by the variable's value and fails when it is unset;
/// `${VAR:-fallback}` uses `fallback` instead.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        config.store.path = Self::expand_path(&config.store.path);
        if let Some(dir) = config.logging.directory.as_mut() {
            *dir = Self::expand_path(dir);
        }
        Ok(config)
    }

    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let value = match (std::env::var(var_name), cap.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(fallback)) => fallback.as_str().to_string(),
                (Err(_), None) => return Err(ConfigError::EnvVarNotSet(var_name.to_string())),
            };
            result = result.replace(&cap[0], &value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.hourglass`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}
