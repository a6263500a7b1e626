//! Compilation request schema for ireedock.
//!
//! This crate is the configuration engine: JSON request documents
//! (`CompilationConfig`), the single validation rule set (`validate`,
//! `validate_document`), idempotent normalization (`normalize`), the
//! validated unit of work (`CompilationRequest`), and per-target example
//! requests (`generate_example`). It has no dependency on staging or
//! container execution.

pub mod config;
pub mod example;
pub mod normalize;
pub mod paths;
pub mod request;
pub mod rules;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, CompilationConfig, CompilationOptions, CpuOptions,
    CudaOptions, Metadata, MetalOptions, TargetSpecific, VulkanOptions, CONFIG_MOUNT,
    DEFAULT_OUTPUT_FILE, INPUT_MOUNT, IR_EXTENSION, OUTPUT_MOUNT,
};
pub use example::generate_example;
pub use normalize::normalize;
pub use paths::canonicalize_logical;
pub use request::{CompilationRequest, TargetOptions};
pub use rules::{
    check_target_features, validate, validate_document, Stage, ValidationReport, Violation,
    ViolationKind,
};
pub use types::{MemoryPlanning, OptimizationLevel, OutputFormat, Target};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration:\n{0}")]
    Invalid(ValidationReport),
}

impl ConfigError {
    /// The validation report, when this is a rule failure.
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Invalid(report) => Some(report),
            _ => None,
        }
    }
}
