use crate::config::{
    CompilationConfig, CompilationOptions, CpuOptions, CudaOptions, Metadata, MetalOptions,
    TargetSpecific, VulkanOptions, INPUT_MOUNT, OUTPUT_MOUNT,
};
use crate::normalize::normalize;
use crate::rules::validate;
use crate::types::{OptimizationLevel, OutputFormat, Target};
use crate::ConfigError;
use serde::Serialize;

/// Options for exactly one target. The variant decides the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum TargetOptions {
    Cuda(CudaOptions),
    Cpu(CpuOptions),
    Vulkan(VulkanOptions),
    Metal(MetalOptions),
}

impl TargetOptions {
    pub fn target(&self) -> Target {
        match self {
            Self::Cuda(_) => Target::Cuda,
            Self::Cpu(_) => Target::Cpu,
            Self::Vulkan(_) => Target::Vulkan,
            Self::Metal(_) => Target::Metal,
        }
    }

    /// The selected record from `specific`, or its defaults when absent.
    pub fn select(target: Target, specific: &TargetSpecific) -> Self {
        match target {
            Target::Cuda => Self::Cuda(specific.cuda.clone().unwrap_or_default()),
            Target::Cpu => Self::Cpu(specific.cpu.clone().unwrap_or_default()),
            Target::Vulkan => Self::Vulkan(specific.vulkan.clone().unwrap_or_default()),
            Target::Metal => Self::Metal(specific.metal.clone().unwrap_or_default()),
        }
    }

    fn to_target_specific(&self) -> TargetSpecific {
        let mut out = TargetSpecific::default();
        match self {
            Self::Cuda(o) => out.cuda = Some(o.clone()),
            Self::Cpu(o) => out.cpu = Some(o.clone()),
            Self::Vulkan(o) => out.vulkan = Some(o.clone()),
            Self::Metal(o) => out.metal = Some(o.clone()),
        }
        out
    }
}

/// A validated, normalized unit of work.
///
/// Only constructed through [`CompilationRequest::from_config`], so every
/// value satisfies the full rule set. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationRequest {
    input_path: String,
    output_path: String,
    optimization_level: OptimizationLevel,
    output_format: OutputFormat,
    target_features: Vec<String>,
    options: TargetOptions,
    validation: bool,
    benchmark: bool,
    verbose: bool,
    compilation_options: CompilationOptions,
    metadata: Metadata,
}

impl CompilationRequest {
    /// Normalize then validate `config`. Sub-records for other targets are
    /// dropped.
    pub fn from_config(config: &CompilationConfig) -> Result<Self, ConfigError> {
        let normalized = normalize(config);
        let report = validate(&normalized);
        if !report.is_valid() {
            return Err(ConfigError::Invalid(report));
        }
        Ok(Self {
            options: TargetOptions::select(normalized.target, &normalized.target_specific),
            input_path: normalized.input_file,
            output_path: normalized.output_file,
            optimization_level: normalized.optimization_level,
            output_format: normalized.output_format,
            target_features: normalized.target_features,
            validation: normalized.validation,
            benchmark: normalized.benchmark,
            verbose: normalized.verbose,
            compilation_options: normalized.compilation_options,
            metadata: normalized.metadata,
        })
    }

    pub fn target(&self) -> Target {
        self.options.target()
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    /// File name of the input inside its mount point.
    pub fn input_name(&self) -> &str {
        crate::paths::base_name(&self.input_path)
    }

    /// File name of the output inside its mount point.
    pub fn output_name(&self) -> &str {
        crate::paths::base_name(&self.output_path)
    }

    pub fn optimization_level(&self) -> OptimizationLevel {
        self.optimization_level
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn target_features(&self) -> &[String] {
        &self.target_features
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    pub fn validation(&self) -> bool {
        self.validation
    }

    pub fn benchmark(&self) -> bool {
        self.benchmark
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn compilation_options(&self) -> &CompilationOptions {
        &self.compilation_options
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Back to the document form, carrying only the selected target record.
    pub fn to_config(&self) -> CompilationConfig {
        CompilationConfig {
            input_file: self.input_path.clone(),
            output_file: self.output_path.clone(),
            target: self.target(),
            optimization_level: self.optimization_level,
            target_features: self.target_features.clone(),
            output_format: self.output_format,
            validation: self.validation,
            benchmark: self.benchmark,
            verbose: self.verbose,
            compilation_options: self.compilation_options.clone(),
            target_specific: self.options.to_target_specific(),
            metadata: self.metadata.clone(),
        }
    }

    /// The document handed to the toolchain container, pointing at the staged
    /// input and reserved output names.
    pub fn container_document(&self, input_name: &str, output_name: &str) -> CompilationConfig {
        let mut doc = self.to_config();
        doc.input_file = format!("{INPUT_MOUNT}/{input_name}");
        doc.output_file = format!("{OUTPUT_MOUNT}/{output_name}");
        doc
    }

    /// Stable blake3 digest of the request content.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_string(&self.to_config())?;
        Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }
}

impl TryFrom<&CompilationConfig> for CompilationRequest {
    type Error = ConfigError;

    fn try_from(config: &CompilationConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}
