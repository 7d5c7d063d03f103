//! Error types for backend launches and configuration loading

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned synchronously by [`Backend::run_app`](crate::backend::Backend::run_app)
#[derive(Debug, Error)]
pub enum BackendError {
    /// The interpreter executable is not on the search path
    #[error("could not locate {name} installation")]
    InterpreterNotFound {
        /// Executable name that was searched for
        name: String,
    },
    /// The OS could not hand out an ephemeral port
    #[error("failed to allocate a free port: {0}")]
    PortAllocation(#[source] io::Error),
}

/// Errors raised while reading or writing the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment variable naming the config file is unset or empty
    #[error("{0} environment variable not set")]
    MissingEnv(&'static str),
    /// The config file could not be read or written
    #[error("configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The config file is not valid JSON for [`Config`](crate::config::Config)
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// `background` is neither "max" nor a number
    #[error("invalid backend count '{0}', expected \"max\" or a number")]
    InvalidBackendCount(String),
    /// A path given to `belgic config` was rejected
    #[error("{0}")]
    InvalidPath(&'static str),
}
