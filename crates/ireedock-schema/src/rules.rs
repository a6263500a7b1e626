//! The validation rule set for compilation requests.
//!
//! There is one engine with two passes. The shape pass walks a raw JSON
//! document and reports type mismatches, unknown keys, and unsupported enum
//! values. The rule pass runs [`RULES`] in order over a typed
//! [`CompilationConfig`]; each rule is tagged with the [`Stage`] it belongs to
//! and every rule exists exactly once. Nothing short-circuits: a report holds
//! every violation found.

use crate::config::{
    CompilationConfig, CpuOptions, CudaOptions, MetalOptions, VulkanOptions, INPUT_MOUNT,
    IR_EXTENSION, OUTPUT_MOUNT,
};
use crate::paths::is_under_mount;
use crate::types::{parse_version, MemoryPlanning, OptimizationLevel, OutputFormat, Target};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const CPU_VECTOR_EXTENSIONS: &[&str] = &[
    "sse", "sse2", "sse3", "ssse3", "sse4.1", "sse4.2", "avx", "avx2", "avx512", "neon", "fma",
    "f16c", "bmi", "bmi2",
];
/// Extensions that only exist on x86 and are rejected for `arm64`.
pub const X86_VECTOR_EXTENSIONS: &[&str] = &[
    "sse", "sse2", "sse3", "ssse3", "sse4.1", "sse4.2", "avx", "avx2", "avx512",
];
pub const CPU_GENERIC_FEATURES: &[&str] = &["generic", "native"];
pub const SPIRV_FEATURES: &[&str] = &[
    "spirv1.0", "spirv1.1", "spirv1.2", "spirv1.3", "spirv1.4", "spirv1.5", "spirv1.6",
];
pub const METAL_FEATURES: &[&str] = &[
    "metal2.0", "metal2.1", "metal2.2", "metal2.3", "metal2.4", "metal3.0",
];
pub const SPIRV_VERSIONS: &[&str] = &["1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6"];
pub const VULKAN_VERSIONS: &[&str] = &["1.0", "1.1", "1.2", "1.3"];
pub const METAL_VERSIONS: &[&str] = &["2.0", "2.1", "2.2", "2.3", "2.4", "3.0"];

pub const MIN_THREADS_PER_BLOCK: u32 = 32;
pub const MAX_THREADS_PER_BLOCK: u32 = 1024;
pub const MAX_CPU_THREADS: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Type or shape mismatch.
    SchemaViolation,
    /// Two or more fields disagree.
    CrossFieldViolation,
    /// A value outside its fixed set.
    UnsupportedValue,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SchemaViolation => "schema violation",
            Self::CrossFieldViolation => "cross-field violation",
            Self::UnsupportedValue => "unsupported value",
        })
    }
}

/// Which pass a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Field-local checks: types, enum membership, numeric bounds.
    Schema,
    /// Checks over the request as a whole: paths, formats, target consistency.
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub stage: Stage,
    /// Dotted path of the offending field, `$` for the document itself.
    pub field: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation. Exact duplicates are kept once.
    pub fn push(&mut self, violation: Violation) {
        if !self.violations.contains(&violation) {
            self.violations.push(violation);
        }
    }

    pub fn extend(&mut self, other: ValidationReport) {
        for v in other.violations {
            self.push(v);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// The `(ok, errors)` pair callers report to users.
    pub fn into_parts(self) -> (bool, Vec<String>) {
        (self.is_valid(), self.messages())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {v}")?;
        }
        Ok(())
    }
}

struct Sink<'a> {
    stage: Stage,
    report: &'a mut ValidationReport,
}

impl Sink<'_> {
    fn push(&mut self, kind: ViolationKind, field: impl Into<String>, message: impl Into<String>) {
        self.report.push(Violation {
            kind,
            stage: self.stage,
            field: field.into(),
            message: message.into(),
        });
    }
}

pub struct Rule {
    pub name: &'static str,
    pub stage: Stage,
    check: fn(&CompilationConfig, &mut Sink<'_>),
}

/// The ordered rule set. Violations are reported as a set; order only
/// affects the order messages are listed in.
pub const RULES: &[Rule] = &[
    Rule {
        name: "cuda_options",
        stage: Stage::Schema,
        check: check_cuda_options,
    },
    Rule {
        name: "cpu_options",
        stage: Stage::Schema,
        check: check_cpu_options,
    },
    Rule {
        name: "vulkan_options",
        stage: Stage::Schema,
        check: check_vulkan_options,
    },
    Rule {
        name: "metal_options",
        stage: Stage::Schema,
        check: check_metal_options,
    },
    Rule {
        name: "path_shape",
        stage: Stage::Model,
        check: check_paths,
    },
    Rule {
        name: "format_extension",
        stage: Stage::Model,
        check: check_format_extension,
    },
    Rule {
        name: "target_features",
        stage: Stage::Model,
        check: check_features,
    },
    Rule {
        name: "target_consistency",
        stage: Stage::Model,
        check: check_target_consistency,
    },
];

/// Run every rule over a typed request.
pub fn validate(config: &CompilationConfig) -> ValidationReport {
    let mut report = ValidationReport::new();
    for rule in RULES {
        let mut sink = Sink {
            stage: rule.stage,
            report: &mut report,
        };
        (rule.check)(config, &mut sink);
    }
    report
}

/// Validate a raw JSON document: the shape pass, then, if the document is
/// well-formed, every rule.
pub fn validate_document(doc: &Value) -> ValidationReport {
    let mut report = check_shape(doc);
    if !report.is_valid() {
        return report;
    }
    match serde_json::from_value::<CompilationConfig>(doc.clone()) {
        Ok(config) => report.extend(validate(&config)),
        Err(e) => report.push(Violation {
            kind: ViolationKind::SchemaViolation,
            stage: Stage::Schema,
            field: "$".to_owned(),
            message: e.to_string(),
        }),
    }
    report
}

/// Check a feature list against the lexical rule for `target`.
pub fn check_target_features(target: Target, features: &[String]) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mut sink = Sink {
        stage: Stage::Model,
        report: &mut report,
    };
    feature_violations(target, features, &mut sink);
    report
}

fn is_compute_capability(s: &str) -> bool {
    s.strip_prefix("sm_")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn feature_violations(target: Target, features: &[String], sink: &mut Sink<'_>) {
    for feature in features {
        let field = "target_features";
        match target {
            Target::Cuda => {
                if !is_compute_capability(feature) {
                    sink.push(
                        ViolationKind::SchemaViolation,
                        field,
                        format!("CUDA target features must look like 'sm_<digits>': '{feature}'"),
                    );
                }
            }
            Target::Cpu => {
                let f = feature.as_str();
                if !CPU_VECTOR_EXTENSIONS.contains(&f) && !CPU_GENERIC_FEATURES.contains(&f) {
                    sink.push(
                        ViolationKind::UnsupportedValue,
                        field,
                        format!("unsupported CPU feature '{feature}'"),
                    );
                }
            }
            Target::Vulkan => {
                if !SPIRV_FEATURES.contains(&feature.as_str()) {
                    sink.push(
                        ViolationKind::UnsupportedValue,
                        field,
                        format!(
                            "unsupported Vulkan feature '{feature}', expected one of: {}",
                            SPIRV_FEATURES.join(", ")
                        ),
                    );
                }
            }
            Target::Metal => {
                if !METAL_FEATURES.contains(&feature.as_str()) {
                    sink.push(
                        ViolationKind::UnsupportedValue,
                        field,
                        format!(
                            "unsupported Metal feature '{feature}', expected one of: {}",
                            METAL_FEATURES.join(", ")
                        ),
                    );
                }
            }
        }
    }
}

// Sub-record checks run for every record present, selected target or not.

fn check_cuda_options(config: &CompilationConfig, sink: &mut Sink<'_>) {
    let Some(CudaOptions {
        compute_capability,
        max_threads_per_block,
        ..
    }) = &config.target_specific.cuda
    else {
        return;
    };
    for cc in compute_capability {
        if !is_compute_capability(cc) {
            sink.push(
                ViolationKind::SchemaViolation,
                "target_specific.cuda.compute_capability",
                format!("compute capability must look like 'sm_<digits>': '{cc}'"),
            );
        }
    }
    let threads = *max_threads_per_block;
    if !(MIN_THREADS_PER_BLOCK..=MAX_THREADS_PER_BLOCK).contains(&threads) {
        sink.push(
            ViolationKind::SchemaViolation,
            "target_specific.cuda.max_threads_per_block",
            format!(
                "must be between {MIN_THREADS_PER_BLOCK} and {MAX_THREADS_PER_BLOCK}, got {threads}"
            ),
        );
    } else if threads % 32 != 0 {
        sink.push(
            ViolationKind::SchemaViolation,
            "target_specific.cuda.max_threads_per_block",
            format!("must be a multiple of 32, got {threads}"),
        );
    }
}

fn check_cpu_options(config: &CompilationConfig, sink: &mut Sink<'_>) {
    let Some(CpuOptions {
        vector_extensions,
        num_threads,
        ..
    }) = &config.target_specific.cpu
    else {
        return;
    };
    for ext in vector_extensions {
        if !CPU_VECTOR_EXTENSIONS.contains(&ext.as_str()) {
            sink.push(
                ViolationKind::UnsupportedValue,
                "target_specific.cpu.vector_extensions",
                format!("unsupported vector extension '{ext}'"),
            );
        }
    }
    if *num_threads > MAX_CPU_THREADS {
        sink.push(
            ViolationKind::SchemaViolation,
            "target_specific.cpu.num_threads",
            format!("must be between 0 and {MAX_CPU_THREADS}, got {num_threads}"),
        );
    }
}

fn check_vulkan_options(config: &CompilationConfig, sink: &mut Sink<'_>) {
    let Some(VulkanOptions {
        spirv_version,
        vulkan_version,
    }) = &config.target_specific.vulkan
    else {
        return;
    };
    if !SPIRV_VERSIONS.contains(&spirv_version.as_str()) {
        sink.push(
            ViolationKind::UnsupportedValue,
            "target_specific.vulkan.spirv_version",
            format!(
                "unsupported SPIR-V version '{spirv_version}', expected one of: {}",
                SPIRV_VERSIONS.join(", ")
            ),
        );
    }
    if !VULKAN_VERSIONS.contains(&vulkan_version.as_str()) {
        sink.push(
            ViolationKind::UnsupportedValue,
            "target_specific.vulkan.vulkan_version",
            format!(
                "unsupported Vulkan version '{vulkan_version}', expected one of: {}",
                VULKAN_VERSIONS.join(", ")
            ),
        );
    }
}

fn check_metal_options(config: &CompilationConfig, sink: &mut Sink<'_>) {
    let Some(metal) = &config.target_specific.metal else {
        return;
    };
    if !METAL_VERSIONS.contains(&metal.metal_version.as_str()) {
        sink.push(
            ViolationKind::UnsupportedValue,
            "target_specific.metal.metal_version",
            format!(
                "unsupported Metal version '{}', expected one of: {}",
                metal.metal_version,
                METAL_VERSIONS.join(", ")
            ),
        );
    }
    let targets = [
        ("ios_deployment_target", &metal.ios_deployment_target),
        ("macos_deployment_target", &metal.macos_deployment_target),
    ];
    for (name, value) in targets {
        if let Some(v) = value {
            if parse_version(v).is_none() {
                sink.push(
                    ViolationKind::SchemaViolation,
                    format!("target_specific.metal.{name}"),
                    format!("expected a 'major.minor' version, got '{v}'"),
                );
            }
        }
    }
}

fn check_paths(config: &CompilationConfig, sink: &mut Sink<'_>) {
    if !is_under_mount(&config.input_file, INPUT_MOUNT)
        || !config.input_file.ends_with(IR_EXTENSION)
    {
        sink.push(
            ViolationKind::SchemaViolation,
            "input_file",
            format!(
                "must be inside {INPUT_MOUNT}/ and have the {IR_EXTENSION} extension: '{}'",
                config.input_file
            ),
        );
    }
    if !is_under_mount(&config.output_file, OUTPUT_MOUNT) {
        sink.push(
            ViolationKind::SchemaViolation,
            "output_file",
            format!(
                "must be inside {OUTPUT_MOUNT}/: '{}'",
                config.output_file
            ),
        );
    }
}

fn check_format_extension(config: &CompilationConfig, sink: &mut Sink<'_>) {
    let expected = config.output_format.extension();
    if !config.output_file.ends_with(expected) {
        sink.push(
            ViolationKind::CrossFieldViolation,
            "output_file",
            format!(
                "extension must match output_format '{}' ({expected}): '{}'",
                config.output_format, config.output_file
            ),
        );
    }
}

fn check_features(config: &CompilationConfig, sink: &mut Sink<'_>) {
    feature_violations(config.target, &config.target_features, sink);
}

// Cross-field rules only look at the sub-record of the selected target.
fn check_target_consistency(config: &CompilationConfig, sink: &mut Sink<'_>) {
    let specific = &config.target_specific;
    match config.target {
        Target::Cuda => {
            if let Some(cuda) = &specific.cuda {
                cuda_consistency(&config.target_features, cuda, sink);
            }
        }
        Target::Cpu => {
            if let Some(cpu) = &specific.cpu {
                cpu_consistency(cpu, sink);
            }
        }
        Target::Vulkan => {
            if let Some(vulkan) = &specific.vulkan {
                vulkan_consistency(vulkan, sink);
            }
        }
        Target::Metal => {
            if let Some(metal) = &specific.metal {
                metal_consistency(metal, sink);
            }
        }
    }
}

fn cuda_consistency(features: &[String], cuda: &CudaOptions, sink: &mut Sink<'_>) {
    if features.is_empty() || cuda.compute_capability.is_empty() {
        return;
    }
    for cc in &cuda.compute_capability {
        if !features.contains(cc) {
            sink.push(
                ViolationKind::CrossFieldViolation,
                "target_specific.cuda.compute_capability",
                format!("compute capability '{cc}' is not listed in target_features"),
            );
        }
    }
}

fn cpu_consistency(cpu: &CpuOptions, sink: &mut Sink<'_>) {
    if cpu.target_cpu != "arm64" {
        return;
    }
    for ext in &cpu.vector_extensions {
        if X86_VECTOR_EXTENSIONS.contains(&ext.as_str()) {
            sink.push(
                ViolationKind::CrossFieldViolation,
                "target_specific.cpu.vector_extensions",
                format!("x86 extension '{ext}' is not available on arm64"),
            );
        }
    }
}

fn vulkan_consistency(vulkan: &VulkanOptions, sink: &mut Sink<'_>) {
    let (Some(spirv), Some(api)) = (
        parse_version(&vulkan.spirv_version),
        parse_version(&vulkan.vulkan_version),
    ) else {
        return;
    };
    if spirv >= (1, 4) && api < (1, 1) {
        sink.push(
            ViolationKind::CrossFieldViolation,
            "target_specific.vulkan.vulkan_version",
            format!(
                "SPIR-V {} requires Vulkan 1.1 or newer, got {}",
                vulkan.spirv_version, vulkan.vulkan_version
            ),
        );
    }
}

fn metal_consistency(metal: &MetalOptions, sink: &mut Sink<'_>) {
    if metal.metal_version != "3.0" {
        return;
    }
    let minimums = [
        ("ios_deployment_target", "iOS", &metal.ios_deployment_target, (15, 0)),
        ("macos_deployment_target", "macOS", &metal.macos_deployment_target, (12, 0)),
    ];
    for (name, os, value, minimum) in minimums {
        let Some(raw) = value else { continue };
        let Some(version) = parse_version(raw) else {
            continue;
        };
        if version < minimum {
            sink.push(
                ViolationKind::CrossFieldViolation,
                format!("target_specific.metal.{name}"),
                format!(
                    "Metal 3.0 requires {os} {}.{} or newer, got {raw}",
                    minimum.0, minimum.1
                ),
            );
        }
    }
}

// Shape pass over raw JSON.

#[derive(Clone, Copy)]
enum Shape {
    Str,
    OptStr,
    Bool,
    UInt,
    StrList,
    OneOf(&'static [&'static str]),
    Object(&'static [(&'static str, Shape)]),
    OptObject(&'static [(&'static str, Shape)]),
}

const DOCUMENT: &[(&str, Shape)] = &[
    ("input_file", Shape::Str),
    ("output_file", Shape::Str),
    ("target", Shape::OneOf(Target::NAMES)),
    ("optimization_level", Shape::OneOf(OptimizationLevel::NAMES)),
    ("target_features", Shape::StrList),
    ("output_format", Shape::OneOf(OutputFormat::NAMES)),
    ("validation", Shape::Bool),
    ("benchmark", Shape::Bool),
    ("verbose", Shape::Bool),
    ("compilation_options", Shape::Object(COMPILATION_OPTIONS)),
    ("target_specific", Shape::Object(TARGET_SPECIFIC)),
    ("metadata", Shape::Object(METADATA)),
];

const COMPILATION_OPTIONS: &[(&str, Shape)] = &[
    ("enable_assertions", Shape::Bool),
    ("strip_debug_info", Shape::Bool),
    ("enable_profiling", Shape::Bool),
    ("memory_planning", Shape::OneOf(MemoryPlanning::NAMES)),
];

const TARGET_SPECIFIC: &[(&str, Shape)] = &[
    ("cuda", Shape::OptObject(CUDA)),
    ("cpu", Shape::OptObject(CPU)),
    ("vulkan", Shape::OptObject(VULKAN)),
    ("metal", Shape::OptObject(METAL)),
];

const CUDA: &[(&str, Shape)] = &[
    ("compute_capability", Shape::StrList),
    ("max_threads_per_block", Shape::UInt),
    ("use_fast_math", Shape::Bool),
];

const CPU: &[(&str, Shape)] = &[
    ("target_cpu", Shape::Str),
    ("vector_extensions", Shape::StrList),
    ("num_threads", Shape::UInt),
];

const VULKAN: &[(&str, Shape)] = &[
    ("spirv_version", Shape::Str),
    ("vulkan_version", Shape::Str),
];

const METAL: &[(&str, Shape)] = &[
    ("metal_version", Shape::Str),
    ("ios_deployment_target", Shape::OptStr),
    ("macos_deployment_target", Shape::OptStr),
];

const METADATA: &[(&str, Shape)] = &[
    ("description", Shape::OptStr),
    ("version", Shape::OptStr),
    ("author", Shape::OptStr),
    ("tags", Shape::StrList),
];

/// The shape pass alone: structure, types, and enum membership.
pub(crate) fn check_shape(doc: &Value) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mut sink = Sink {
        stage: Stage::Schema,
        report: &mut report,
    };
    if doc.is_object() && doc.get("input_file").is_none() {
        sink.push(
            ViolationKind::SchemaViolation,
            "input_file",
            "required field is missing",
        );
    }
    check_value(doc, Shape::Object(DOCUMENT), "$", &mut sink);
    report
}

fn child_path(parent: &str, key: &str) -> String {
    if parent == "$" {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

fn check_value(value: &Value, shape: Shape, path: &str, sink: &mut Sink<'_>) {
    let schema = ViolationKind::SchemaViolation;
    match shape {
        Shape::Str => {
            if !value.is_string() {
                sink.push(schema, path, format!("expected a string, got {}", kind_of(value)));
            }
        }
        Shape::OptStr => {
            if !value.is_string() && !value.is_null() {
                sink.push(schema, path, format!("expected a string, got {}", kind_of(value)));
            }
        }
        Shape::Bool => {
            if !value.is_boolean() {
                sink.push(schema, path, format!("expected a boolean, got {}", kind_of(value)));
            }
        }
        Shape::UInt => {
            if !value.as_u64().is_some_and(|n| u32::try_from(n).is_ok()) {
                sink.push(
                    schema,
                    path,
                    format!("expected a non-negative integer, got {value}"),
                );
            }
        }
        Shape::StrList => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        sink.push(
                            schema,
                            format!("{path}[{i}]"),
                            format!("expected a string, got {}", kind_of(item)),
                        );
                    }
                }
            }
            None => sink.push(schema, path, format!("expected an array, got {}", kind_of(value))),
        },
        Shape::OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => sink.push(
                ViolationKind::UnsupportedValue,
                path,
                format!("unsupported value '{s}', expected one of: {}", allowed.join(", ")),
            ),
            None => sink.push(schema, path, format!("expected a string, got {}", kind_of(value))),
        },
        Shape::OptObject(_) if value.is_null() => {}
        Shape::Object(fields) | Shape::OptObject(fields) => {
            let Some(map) = value.as_object() else {
                sink.push(schema, path, format!("expected an object, got {}", kind_of(value)));
                return;
            };
            for (key, child) in map {
                let nested = child_path(path, key);
                match fields.iter().find(|(name, _)| name == key) {
                    Some((_, child_shape)) => check_value(child, *child_shape, &nested, sink),
                    None => sink.push(schema, nested, "unknown field"),
                }
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
