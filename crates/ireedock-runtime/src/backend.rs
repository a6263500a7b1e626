use crate::sandbox::RunSpec;
use crate::RuntimeError;
use serde::Serialize;
use std::path::Path;

/// Everything a container printed, plus how it exited.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub log: String,
}

impl ContainerOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageStatus {
    pub image: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ImageStatus {
    pub fn missing(image: &str) -> Self {
        Self {
            image: image.to_owned(),
            available: false,
            size: None,
            created: None,
            id: None,
        }
    }
}

/// Container engine facts for `ireedock status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub backend: String,
    pub server_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u64>,
    pub operating_system: String,
    pub architecture: String,
}

pub trait ContainerBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine is installed and answering.
    fn available(&self) -> bool;

    fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    fn build_image(&self, image: &str, context: &Path, dockerfile: &Path)
        -> Result<(), RuntimeError>;

    /// Run a container to completion. A non-zero exit is reported in the
    /// output, not as an error; errors mean the container never ran.
    fn run(&self, spec: &RunSpec) -> Result<ContainerOutput, RuntimeError>;

    fn image_status(&self, image: &str) -> Result<ImageStatus, RuntimeError>;

    fn system_info(&self) -> Result<SystemInfo, RuntimeError>;
}

pub fn select_backend(name: &str) -> Result<Box<dyn ContainerBackend>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::CliBackend::docker())),
        "podman" => Ok(Box::new(crate::docker::CliBackend::podman())),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::UnknownBackend(other.to_owned())),
    }
}
