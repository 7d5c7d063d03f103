use crate::error::BackendError;
use crate::invocation::build_invocation;
use crate::launcher::{launch, locate_interpreter, LaunchMonitor, DEFAULT_INTERPRETER};
use parking_lot::RwLock;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Base URL a backend on `port` is reachable at
pub fn base_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// Port and URL of a backend, always written together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Assigned port, 0 until the first successful launch
    pub port: u16,
    /// `http://localhost:<port>`, empty until the first successful launch
    pub path: String,
}

impl Address {
    fn for_port(port: u16) -> Self {
        Self {
            port,
            path: base_url(port),
        }
    }

    /// True once a port has been assigned
    pub fn is_assigned(&self) -> bool {
        self.port != 0
    }
}

/// One supervised R application instance.
///
/// The working directory is fixed at construction. The port and URL live
/// behind a read-write lock owned by the backend itself, so readers on other
/// threads always see both or neither.
///
/// # Blocking
///
/// [`run_app`](Backend::run_app) has no deadline. Interpreter lookup and port
/// allocation are blocking syscalls and a hang in either blocks the caller.
#[derive(Debug)]
pub struct Backend {
    working_dir: PathBuf,
    interpreter: String,
    search_path: Option<OsString>,
    address: RwLock<Address>,
}

impl Backend {
    /// Create an unstarted backend for the application in `working_dir`
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            search_path: None,
            address: RwLock::new(Address::default()),
        }
    }

    /// Use a different interpreter executable name (builder pattern)
    pub fn with_interpreter(mut self, name: &str) -> Self {
        self.interpreter = name.to_string();
        self
    }

    /// Search these directories instead of `$PATH` (builder pattern)
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    /// Current port, 0 when never launched
    pub fn port(&self) -> u16 {
        self.address.read().port
    }

    /// Current base URL, empty when never launched
    pub fn path(&self) -> String {
        self.address.read().path.clone()
    }

    /// Port and URL read under a single lock
    pub fn address(&self) -> Address {
        self.address.read().clone()
    }

    /// Allocate a port, publish the URL and start the application.
    ///
    /// Returns once the launch is scheduled, not when the application is
    /// serving. Every call allocates a fresh port. On error nothing is
    /// changed, so the call can simply be retried. Failures of the child
    /// process itself only show up on the returned [`LaunchMonitor`].
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run_app(&self) -> Result<LaunchMonitor, BackendError> {
        // Relative search path entries are taken relative to the supervisor's cwd
        let cwd = std::env::current_dir().unwrap_or_else(|_| self.working_dir.clone());
        let interpreter =
            locate_interpreter(&self.interpreter, self.search_path.as_deref(), &cwd)
                .inspect_err(|e| {
                    warn!(interpreter = %self.interpreter, error = %e, "Interpreter not found on search path");
                })?;

        debug!(interpreter = %interpreter.display(), "Resolved interpreter");

        let invocation =
            build_invocation(&self.working_dir).map_err(BackendError::PortAllocation)?;

        let url = {
            let mut address = self.address.write();
            *address = Address::for_port(invocation.port);
            address.path.clone()
        };

        info!(
            working_dir = %self.working_dir.display(),
            port = invocation.port,
            %url,
            "Launching backend"
        );

        Ok(launch(&interpreter, invocation.script, invocation.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::LaunchStatus;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn missing_interpreter_backend() -> (Backend, tempfile::TempDir) {
        let empty = tempfile::tempdir().unwrap();
        let backend = Backend::new("/apps/demo").with_search_path(empty.path().as_os_str());
        (backend, empty)
    }

    #[test]
    fn test_base_url_format() {
        assert_eq!(base_url(8123), "http://localhost:8123");
        assert_eq!(base_url(80), "http://localhost:80");
    }

    #[test]
    fn test_new_backend_is_unassigned() {
        let backend = Backend::new("/apps/demo");
        assert_eq!(backend.port(), 0);
        assert_eq!(backend.path(), "");
        assert!(!backend.address().is_assigned());
        assert_eq!(backend.working_directory(), Path::new("/apps/demo"));
    }

    #[tokio::test]
    async fn test_run_app_missing_interpreter() {
        let (backend, _dir) = missing_interpreter_backend();

        let result = backend.run_app().await;
        assert!(matches!(
            result,
            Err(BackendError::InterpreterNotFound { ref name }) if name == "R"
        ));
        assert_eq!(backend.address(), Address::default());
    }

    #[tokio::test]
    async fn test_failed_run_can_be_retried() {
        let (backend, _dir) = missing_interpreter_backend();

        assert!(backend.run_app().await.is_err());
        assert!(backend.run_app().await.is_err());
        assert_eq!(backend.port(), 0);
        assert_eq!(backend.path(), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_same_backend_recovers_after_missing_interpreter() {
        use std::os::unix::fs::PermissionsExt;

        let (backend, dir) = missing_interpreter_backend();
        assert!(matches!(
            backend.run_app().await,
            Err(BackendError::InterpreterNotFound { .. })
        ));
        assert_eq!(backend.address(), Address::default());

        let interpreter = dir.path().join("R");
        std::fs::write(&interpreter, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&interpreter, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut monitor = backend.run_app().await.unwrap();
        let address = backend.address();
        assert_ne!(address.port, 0);
        assert_eq!(address.port, monitor.port());
        assert_eq!(address.path, base_url(address.port));
        assert!(monitor.finished().await.is_finished());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_app_publishes_address() {
        let backend = Backend::new("/apps/demo").with_interpreter("true");

        let mut monitor = backend.run_app().await.unwrap();
        let address = backend.address();

        assert!(address.is_assigned());
        assert_eq!(address.port, monitor.port());
        assert_eq!(address.path, format!("http://localhost:{}", address.port));
        assert_eq!(monitor.finished().await, LaunchStatus::Exited { code: Some(0) });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_keeps_previous_address() {
        let backend = Backend::new("/apps/demo").with_interpreter("true");
        backend.run_app().await.unwrap();
        let before = backend.address();

        let empty = tempfile::tempdir().unwrap();
        let backend = Backend {
            search_path: Some(empty.path().as_os_str().to_os_string()),
            ..backend
        };

        assert!(backend.run_app().await.is_err());
        assert_eq!(backend.address(), before);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_partial_address() {
        let backend = Arc::new(Backend::new("/apps/demo").with_interpreter("true"));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let backend = Arc::clone(&backend);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut observed = 0usize;
                while !done.load(Ordering::SeqCst) {
                    let address = backend.address();
                    if address.port == 0 {
                        assert_eq!(address.path, "");
                    } else {
                        assert_eq!(address.path, base_url(address.port));
                    }
                    observed += 1;
                }
                observed
            })
        };

        let mut ports = Vec::new();
        for _ in 0..20 {
            let monitor = backend.run_app().await.unwrap();
            ports.push(monitor.port());
        }
        done.store(true, Ordering::SeqCst);

        assert!(reader.join().unwrap() > 0);
        assert_eq!(backend.port(), *ports.last().unwrap());
    }
}
