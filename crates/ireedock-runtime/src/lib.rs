//! Container execution layer for ireedock.
//!
//! A pluggable `ContainerBackend` trait with a docker/podman CLI backend and a
//! scripted mock, a lazily-initialized `RuntimeClient`, the image resolution
//! chain (local, pull, build), the sandbox policy every run is launched under,
//! the marker-protocol parser, and the `Executor` that turns one compilation
//! request into an `ExecutionResult`.

pub mod backend;
pub mod client;
pub mod docker;
pub mod executor;
pub mod image;
pub mod markers;
pub mod mock;
pub mod prereq;
pub mod result;
pub mod sandbox;

pub use backend::{select_backend, ContainerBackend, ContainerOutput, ImageStatus, SystemInfo};
pub use client::RuntimeClient;
pub use docker::CliBackend;
pub use executor::{deliver, Executor, RunPlan, CONFIG_FILE_NAME};
pub use image::{ensure_image, ImageConfig, ImageSource, ResolvedImage};
pub use markers::{parse_markers, BenchmarkResults, Markers};
pub use mock::{MockBackend, MockBehavior};
pub use prereq::{check_container_prereqs, format_missing, MissingPrereq};
pub use result::{ExecutionResult, FailureKind, OutputSummary};
pub use sandbox::{BindMount, RunSpec, SandboxPolicy};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("unknown container backend '{0}', expected one of: docker, podman, mock")]
    UnknownBackend(String),
    #[error("`{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("image '{image}' is unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },
    #[error("invalid run specification: {0}")]
    InvalidRunSpec(String),
    #[error("container config document error: {0}")]
    ConfigDocument(#[from] serde_json::Error),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
}
