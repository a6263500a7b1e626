//! Compilation pipeline engine for ireedock.
//!
//! This crate ties the configuration engine, the stager and the container
//! executor together into the `Engine`: load a request, stage its input under
//! an exclusive staging lock, reserve the output, run the toolchain container
//! and deliver the verified artifact. It also owns the TOML `Settings` file,
//! dry-run planning, image/system status, and the process interrupt flag.

pub mod concurrency;
pub mod engine;
pub mod settings;

pub use concurrency::{install_signal_handler, shutdown_requested, StagingLock};
pub use engine::{CompileOptions, CompileReport, DryRun, Engine, StatusReport, TargetStatus};
pub use settings::{default_settings_path, expand_tilde, Settings};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] ireedock_schema::ConfigError),
    #[error("staging error: {0}")]
    Staging(#[from] ireedock_store::StagingError),
    #[error("staging lock: {0}")]
    Lock(std::io::Error),
    #[error("runtime error: {0}")]
    Runtime(#[from] ireedock_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("settings error: {0}")]
    Settings(#[from] toml::de::Error),
}
