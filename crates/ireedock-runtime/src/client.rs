use crate::backend::{select_backend, ContainerBackend};
use crate::RuntimeError;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Owned handle to a container backend, created on first use.
///
/// Each client connects independently, so several executors in one process
/// never share a handle unless they share the client. A backend that turns
/// out to be unavailable is not cached; the next call probes again.
pub struct RuntimeClient {
    backend_name: String,
    backend: OnceLock<Box<dyn ContainerBackend>>,
}

impl RuntimeClient {
    pub fn new(backend_name: impl Into<String>) -> Self {
        Self {
            backend_name: backend_name.into(),
            backend: OnceLock::new(),
        }
    }

    /// Wrap an already-constructed backend.
    pub fn with_backend(backend: Box<dyn ContainerBackend>) -> Self {
        let name = backend.name().to_owned();
        let cell = OnceLock::new();
        let _ = cell.set(backend);
        Self {
            backend_name: name,
            backend: cell,
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn is_connected(&self) -> bool {
        self.backend.get().is_some()
    }

    pub fn backend(&self) -> Result<&dyn ContainerBackend, RuntimeError> {
        if let Some(b) = self.backend.get() {
            return Ok(b.as_ref());
        }
        let created = select_backend(&self.backend_name)?;
        if !created.available() {
            return Err(RuntimeError::BackendUnavailable(self.backend_name.clone()));
        }
        debug!("connected to {} backend", self.backend_name);
        Ok(self.backend.get_or_init(|| created).as_ref())
    }
}

impl fmt::Debug for RuntimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClient")
            .field("backend_name", &self.backend_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}
