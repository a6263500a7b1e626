use crate::config::{
    CompilationConfig, CpuOptions, CudaOptions, Metadata, MetalOptions, TargetSpecific,
    VulkanOptions,
};
use crate::types::{OptimizationLevel, OutputFormat, Target};

pub const EXAMPLE_INPUT: &str = "/input/model.mlir";
pub const EXAMPLE_OUTPUT: &str = "/output/model.vmfb";

/// A ready-to-edit request for `target`. Every example passes validation.
pub fn generate_example(target: Target) -> CompilationConfig {
    let mut config = CompilationConfig::new(EXAMPLE_INPUT);
    config.output_file = EXAMPLE_OUTPUT.to_owned();
    config.target = target;
    config.optimization_level = OptimizationLevel::O3;
    config.output_format = OutputFormat::Vmfb;

    let (features, specific, label): (&[&str], TargetSpecific, &str) = match target {
        Target::Cuda => (
            &["sm_80", "sm_86"][..],
            TargetSpecific {
                cuda: Some(CudaOptions {
                    compute_capability: vec!["sm_80".to_owned(), "sm_86".to_owned()],
                    max_threads_per_block: 256,
                    use_fast_math: false,
                }),
                ..TargetSpecific::default()
            },
            "CUDA",
        ),
        Target::Cpu => (
            &["avx2", "fma"][..],
            TargetSpecific {
                cpu: Some(CpuOptions {
                    target_cpu: "generic".to_owned(),
                    vector_extensions: vec!["avx2".to_owned(), "fma".to_owned()],
                    num_threads: 0,
                }),
                ..TargetSpecific::default()
            },
            "CPU",
        ),
        Target::Vulkan => (
            &["spirv1.3"][..],
            TargetSpecific {
                vulkan: Some(VulkanOptions {
                    spirv_version: "1.3".to_owned(),
                    vulkan_version: "1.1".to_owned(),
                }),
                ..TargetSpecific::default()
            },
            "Vulkan",
        ),
        Target::Metal => (
            &["metal2.4"][..],
            TargetSpecific {
                metal: Some(MetalOptions {
                    metal_version: "2.4".to_owned(),
                    ios_deployment_target: None,
                    macos_deployment_target: Some("11.0".to_owned()),
                }),
                ..TargetSpecific::default()
            },
            "Metal",
        ),
    };

    config.target_features = features.iter().map(|f| (*f).to_owned()).collect();
    config.target_specific = specific;
    config.metadata = Metadata {
        description: Some(format!("Example {label} compilation configuration")),
        version: Some("1.0".to_owned()),
        ..Metadata::default()
    };
    config
}
