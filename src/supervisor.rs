//! Starts the configured number of backends, retrying failed launches
//!
//! Retries only cover errors returned by [`Backend::run_app`]. A child that
//! crashes after being launched is reported on its [`LaunchMonitor`] and is
//! not restarted.

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{BackendError, ConfigError};
use crate::launcher::LaunchMonitor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Pause between launch attempts of the same backend
const RETRY_DELAY_MS: u64 = 100;

/// A backend ran out of launch attempts after others were already started
#[derive(Debug, Error)]
#[error("backend {backend} failed to launch: {source}")]
pub struct StartError {
    /// Index of the backend that failed
    pub backend: usize,
    /// Monitors of the backends launched before the failure; their
    /// processes keep running
    pub launched: Vec<LaunchMonitor>,
    #[source]
    pub source: BackendError,
}

/// Owns every backend of one application
pub struct Supervisor {
    backends: Vec<Arc<Backend>>,
    attempts: u32,
}

impl Supervisor {
    /// Create unstarted backends according to `config`
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let count = config.backend_count()?;
        let backends = (0..count)
            .map(|_| Arc::new(Backend::new(&config.path)))
            .collect();
        Ok(Self::with_backends(backends, config.max_attempts()))
    }

    /// Supervise backends built by the caller
    pub fn with_backends(backends: Vec<Arc<Backend>>, attempts: u32) -> Self {
        Self {
            backends,
            attempts: attempts.max(1),
        }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Launch every backend, stopping at the first one that exhausts its attempts.
    ///
    /// On failure the monitors of already launched backends are handed back
    /// in the [`StartError`].
    pub async fn start(&self) -> Result<Vec<LaunchMonitor>, StartError> {
        let mut monitors = Vec::with_capacity(self.backends.len());
        for (index, backend) in self.backends.iter().enumerate() {
            match self.start_backend(index, backend).await {
                Ok(monitor) => monitors.push(monitor),
                Err(source) => {
                    for monitor in &monitors {
                        warn!(
                            port = monitor.port(),
                            status = ?monitor.status(),
                            "Backend left running after launch failure"
                        );
                    }
                    return Err(StartError {
                        backend: index,
                        launched: monitors,
                        source,
                    });
                }
            }
        }

        info!(backends = monitors.len(), "All backends launched");
        Ok(monitors)
    }

    async fn start_backend(
        &self,
        index: usize,
        backend: &Backend,
    ) -> Result<LaunchMonitor, BackendError> {
        let mut attempt = 1;
        loop {
            match backend.run_app().await {
                Ok(monitor) => return Ok(monitor),
                Err(e) if attempt < self.attempts => {
                    warn!(
                        backend = index,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Backend launch failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                }
                Err(e) => {
                    warn!(backend = index, attempt, error = %e, "Backend launch failed, giving up");
                    return Err(e);
                }
            }
        }
    }

    /// Base URLs of backends that have been assigned a port
    pub fn urls(&self) -> Vec<String> {
        self.backends
            .iter()
            .map(|b| b.address())
            .filter(|a| a.is_assigned())
            .map(|a| a.path)
            .collect()
    }
}
