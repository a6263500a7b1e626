use crate::rules::check_shape;
use crate::types::{MemoryPlanning, OptimizationLevel, OutputFormat, Target};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const INPUT_MOUNT: &str = "/input";
pub const OUTPUT_MOUNT: &str = "/output";
pub const CONFIG_MOUNT: &str = "/config";
pub const IR_EXTENSION: &str = ".mlir";
pub const DEFAULT_OUTPUT_FILE: &str = "/output/model.vmfb";

/// A compilation request document as written by users.
///
/// This is the wire shape: every optional key carries its declared default so
/// that a parsed document is complete, but nothing here has been checked
/// against the rule set yet. See [`crate::validate`] and [`crate::normalize`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CompilationConfig {
    pub input_file: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub optimization_level: OptimizationLevel,
    #[serde(default)]
    pub target_features: Vec<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_true")]
    pub validation: bool,
    #[serde(default)]
    pub benchmark: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub compilation_options: CompilationOptions,
    #[serde(default)]
    pub target_specific: TargetSpecific,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CompilationOptions {
    #[serde(default)]
    pub enable_assertions: bool,
    #[serde(default = "default_true")]
    pub strip_debug_info: bool,
    #[serde(default)]
    pub enable_profiling: bool,
    #[serde(default)]
    pub memory_planning: MemoryPlanning,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            enable_assertions: false,
            strip_debug_info: true,
            enable_profiling: false,
            memory_planning: MemoryPlanning::default(),
        }
    }
}

/// Per-target option records. Only the one matching `target` is consulted.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetSpecific {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuda: Option<CudaOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulkan: Option<VulkanOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metal: Option<MetalOptions>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CudaOptions {
    #[serde(default)]
    pub compute_capability: Vec<String>,
    #[serde(default = "default_threads_per_block")]
    pub max_threads_per_block: u32,
    #[serde(default)]
    pub use_fast_math: bool,
}

impl Default for CudaOptions {
    fn default() -> Self {
        Self {
            compute_capability: Vec::new(),
            max_threads_per_block: default_threads_per_block(),
            use_fast_math: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CpuOptions {
    #[serde(default = "default_target_cpu")]
    pub target_cpu: String,
    #[serde(default)]
    pub vector_extensions: Vec<String>,
    /// Worker threads inside the toolchain; 0 lets the compiler decide.
    #[serde(default)]
    pub num_threads: u32,
}

impl Default for CpuOptions {
    fn default() -> Self {
        Self {
            target_cpu: default_target_cpu(),
            vector_extensions: Vec::new(),
            num_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VulkanOptions {
    #[serde(default = "default_spirv_version")]
    pub spirv_version: String,
    #[serde(default = "default_vulkan_version")]
    pub vulkan_version: String,
}

impl Default for VulkanOptions {
    fn default() -> Self {
        Self {
            spirv_version: default_spirv_version(),
            vulkan_version: default_vulkan_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetalOptions {
    #[serde(default = "default_metal_version")]
    pub metal_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_deployment_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macos_deployment_target: Option<String>,
}

impl Default for MetalOptions {
    fn default() -> Self {
        Self {
            metal_version: default_metal_version(),
            ios_deployment_target: None,
            macos_deployment_target: None,
        }
    }
}

/// Free-form annotations. Never affects validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_FILE.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_threads_per_block() -> u32 {
    256
}

fn default_target_cpu() -> String {
    "generic".to_owned()
}

fn default_spirv_version() -> String {
    "1.3".to_owned()
}

fn default_vulkan_version() -> String {
    "1.1".to_owned()
}

fn default_metal_version() -> String {
    "2.4".to_owned()
}

impl CompilationConfig {
    /// A request with every field at its default.
    pub fn new(input_file: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            output_file: default_output_file(),
            target: Target::default(),
            optimization_level: OptimizationLevel::default(),
            target_features: Vec::new(),
            output_format: OutputFormat::default(),
            validation: true,
            benchmark: false,
            verbose: false,
            compilation_options: CompilationOptions::default(),
            target_specific: TargetSpecific::default(),
            metadata: Metadata::default(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Parse a request document from JSON text.
///
/// The document is first walked by the shape checks so that type errors,
/// unknown keys, and unsupported enum values come back as a full
/// [`crate::ValidationReport`] instead of the first serde error. Consistency
/// rules are not applied here.
pub fn parse_config_str(input: &str) -> Result<CompilationConfig, ConfigError> {
    let doc: serde_json::Value = serde_json::from_str(input)?;
    let report = check_shape(&doc);
    if !report.is_valid() {
        return Err(ConfigError::Invalid(report));
    }
    Ok(serde_json::from_value(doc)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<CompilationConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
