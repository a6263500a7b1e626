use crate::config::{
    CompilationConfig, CpuOptions, CudaOptions, MetalOptions, TargetSpecific, VulkanOptions,
    INPUT_MOUNT, OUTPUT_MOUNT,
};
use crate::paths::rebase_onto_mount;
use crate::types::Target;

/// Produce the canonical form of a request.
///
/// - the sub-record for the selected target is filled with its defaults
///   when absent;
/// - feature and extension lists are trimmed, sorted, and deduplicated;
/// - paths are placed under their mount points, keeping only the base name
///   of any path that is not already inside the mount.
///
/// Normalization never fails and is idempotent. It does not validate:
/// run [`crate::validate`] on the result.
pub fn normalize(config: &CompilationConfig) -> CompilationConfig {
    let mut out = config.clone();

    out.input_file = rebase_onto_mount(config.input_file.trim(), INPUT_MOUNT);
    out.output_file = rebase_onto_mount(config.output_file.trim(), OUTPUT_MOUNT);
    out.target_features = normalize_string_list(&config.target_features);
    out.metadata.tags = normalize_string_list(&config.metadata.tags);
    out.target_specific = normalize_target_specific(config.target, &config.target_specific);

    out
}

impl CompilationConfig {
    pub fn normalize(&self) -> CompilationConfig {
        normalize(self)
    }
}

fn normalize_target_specific(target: Target, specific: &TargetSpecific) -> TargetSpecific {
    let mut out = specific.clone();
    match target {
        Target::Cuda => {
            out.cuda.get_or_insert_with(CudaOptions::default);
        }
        Target::Cpu => {
            out.cpu.get_or_insert_with(CpuOptions::default);
        }
        Target::Vulkan => {
            out.vulkan.get_or_insert_with(VulkanOptions::default);
        }
        Target::Metal => {
            out.metal.get_or_insert_with(MetalOptions::default);
        }
    }
    if let Some(cuda) = out.cuda.as_mut() {
        cuda.compute_capability = normalize_string_list(&cuda.compute_capability);
    }
    if let Some(cpu) = out.cpu.as_mut() {
        cpu.target_cpu = cpu.target_cpu.trim().to_owned();
        cpu.vector_extensions = normalize_string_list(&cpu.vector_extensions);
    }
    out
}

pub(crate) fn normalize_string_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config_str;
    use crate::example::generate_example;
    use crate::rules::validate;
    use crate::types::{OptimizationLevel, OutputFormat};

    #[test]
    fn cpu_scenario_dedupes_sorts_and_validates() {
        let config = parse_config_str(
            r#"{
                "input_file": "/input/model.mlir",
                "output_file": "/output/model.so",
                "target": "cpu",
                "optimization_level": "O2",
                "output_format": "so",
                "target_features": ["avx2", "avx2", "sse2"]
            }"#,
        )
        .unwrap();
        let normalized = normalize(&config);
        assert_eq!(normalized.target_features, vec!["avx2", "sse2"]);
        assert_eq!(normalized.optimization_level, OptimizationLevel::O2);
        assert_eq!(normalized.output_format, OutputFormat::So);
        assert!(validate(&normalized).is_valid());
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut messy = CompilationConfig::new("  ../models/net.mlir ");
        messy.output_file = "/tmp/out/net.so".to_owned();
        messy.target = Target::Cpu;
        messy.target_features = vec![" fma".to_owned(), "avx2".to_owned(), "fma".to_owned(), String::new()];
        messy.target_specific.cuda = Some(CudaOptions {
            compute_capability: vec!["sm_86".to_owned(), "sm_80".to_owned(), "sm_86".to_owned()],
            ..CudaOptions::default()
        });

        let mut inputs = vec![messy];
        inputs.extend(Target::ALL.iter().map(|t| generate_example(*t)));
        for x in inputs {
            let once = normalize(&x);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn valid_requests_stay_valid() {
        for target in Target::ALL {
            let x = generate_example(*target);
            assert!(validate(&x).is_valid());
            assert!(validate(&normalize(&x)).is_valid(), "{target}");
        }
    }

    #[test]
    fn fills_selected_target_record_only() {
        let mut c = CompilationConfig::new("/input/m.mlir");
        c.target = Target::Vulkan;
        let n = normalize(&c);
        assert_eq!(n.target_specific.vulkan, Some(VulkanOptions::default()));
        assert!(n.target_specific.cuda.is_none());
        assert!(n.target_specific.cpu.is_none());
        assert!(n.target_specific.metal.is_none());
    }

    #[test]
    fn paths_move_under_mounts() {
        let mut c = CompilationConfig::new("/home/alice/work/bert.mlir");
        c.output_file = "results/bert.vmfb".to_owned();
        let n = normalize(&c);
        assert_eq!(n.input_file, "/input/bert.mlir");
        assert_eq!(n.output_file, "/output/bert.vmfb");
    }

    #[test]
    fn traversal_is_neutralised() {
        let c = CompilationConfig::new("/input/../../etc/shadow.mlir");
        let n = normalize(&c);
        assert_eq!(n.input_file, "/input/shadow.mlir");
    }

    #[test]
    fn string_list_normalization() {
        let v = normalize_string_list(&[
            " b ".to_owned(),
            "a".to_owned(),
            "b".to_owned(),
            "  ".to_owned(),
        ]);
        assert_eq!(v, vec!["a", "b"]);
    }
}
