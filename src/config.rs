use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Environment variable holding the path to the configuration file
pub const CONFIG_ENV: &str = "BELGIC_CONFIG";

/// File name written by [`Config::create`]
pub const CONFIG_FILE_NAME: &str = "belgic.json";

/// Supervisor configuration, read once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory containing the application's `app.R`
    pub path: String,

    /// Port the application is served on to clients. Backends get their own
    /// free ports regardless.
    pub port: String,

    /// Number of backends to run: "max" or a number
    #[serde(rename = "background")]
    pub backends: String,

    /// Maximum launch attempts per backend
    pub attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: "/belgic".to_string(),
            port: "8080".to_string(),
            backends: "max".to_string(),
            attempts: 5,
        }
    }
}

impl Config {
    /// Load the file named by `BELGIC_CONFIG`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingEnv(CONFIG_ENV))?;
        Self::load_from(path)
    }

    /// Load a configuration file from an explicit path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration JSON
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(content)?;

        // need at least one backend
        if config.backends == "0" {
            config.backends = "1".to_string();
        }

        Ok(config)
    }

    /// Write the default configuration to `<dir>/belgic.json`, returning the file path
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<PathBuf, ConfigError> {
        let file = dir.as_ref().join(CONFIG_FILE_NAME);
        let json = serde_json::to_string_pretty(&Config::default())?;
        std::fs::write(&file, json).map_err(|source| ConfigError::Io {
            path: file.clone(),
            source,
        })?;
        Ok(file)
    }

    /// Resolve the backend count policy
    pub fn backend_count(&self) -> Result<usize, ConfigError> {
        let policy = self.backends.trim();
        if policy.eq_ignore_ascii_case("max") {
            return Ok(std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1));
        }

        policy
            .parse::<usize>()
            .map(|n| n.max(1))
            .map_err(|_| ConfigError::InvalidBackendCount(self.backends.clone()))
    }

    /// Launch attempts per backend, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

/// Check a target directory for `belgic config`
pub fn check_config_path(path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::InvalidPath("must specify a path"));
    }

    if path.ends_with(".json") || path.ends_with(".config") {
        return Err(ConfigError::InvalidPath(
            "specify a path to a directory, not a path to a file",
        ));
    }

    Ok(())
}
