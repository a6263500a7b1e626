use super::{json_pretty, require_prereqs, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use ireedock_core::{CompileOptions, CompileReport, CoreError, DryRun, Engine};
use ireedock_schema::{
    check_target_features, CompilationConfig, CompilationRequest, ConfigError, OptimizationLevel,
    OutputFormat, Target,
};
use ireedock_store::format_size;
use std::path::{Path, PathBuf};

/// Request fields given on the command line.
#[derive(Debug, Clone)]
pub struct CompileArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target: Target,
    pub optimization: OptimizationLevel,
    pub target_features: Vec<String>,
    pub format: OutputFormat,
    pub validate: bool,
    pub benchmark: bool,
    /// A request document that replaces every field above except the paths.
    pub config: Option<PathBuf>,
    pub dry_run: bool,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn build_request(
    engine: &Engine,
    args: &CompileArgs,
    verbose: bool,
) -> Result<CompilationRequest, CoreError> {
    if let Some(config) = &args.config {
        return engine.load_request(config);
    }
    let features = check_target_features(args.target, &args.target_features);
    if !features.is_valid() {
        return Err(ConfigError::Invalid(features).into());
    }
    let mut config = CompilationConfig::new(file_name(&args.input));
    config.output_file = file_name(&args.output);
    config.target = args.target;
    config.optimization_level = args.optimization;
    config.target_features.clone_from(&args.target_features);
    config.output_format = args.format;
    config.validation = args.validate;
    config.benchmark = args.benchmark;
    config.verbose = verbose;
    Ok(CompilationRequest::from_config(&config)?)
}

pub fn run(
    engine: &Engine,
    args: &CompileArgs,
    verbose: bool,
    debug: bool,
    json: bool,
) -> Result<u8, String> {
    let request = build_request(engine, args, verbose).map_err(|e| e.to_string())?;
    if verbose && !json {
        let normalized = request.to_config().to_json_pretty().map_err(|e| e.to_string())?;
        println!("normalized configuration:\n{normalized}");
    }

    if args.dry_run {
        let dry = engine
            .plan(&request, &args.input)
            .map_err(|e| e.to_string())?;
        print_plan(&request, &dry, &args.output, json)?;
        return Ok(EXIT_SUCCESS);
    }

    require_prereqs(engine.client().backend_name())?;

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("compiling for {}...", request.target())))
    };
    let options = CompileOptions {
        destination: Some(args.output.clone()),
        verbose,
        debug,
    };
    let report = match engine.compile(&request, &args.input, &options) {
        Ok(r) => r,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "compilation aborted");
            }
            return Err(e.to_string());
        }
    };
    if let Some(ref pb) = pb {
        if report.success() {
            spin_ok(pb, "compilation completed");
        } else {
            spin_fail(pb, "compilation failed");
        }
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_report(&report, verbose);
    }
    Ok(if report.success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

fn print_plan(
    request: &CompilationRequest,
    dry: &DryRun,
    destination: &Path,
    json: bool,
) -> Result<(), String> {
    if json {
        println!("{}", json_pretty(dry)?);
        return Ok(());
    }
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("dry run, nothing was staged or launched\n");
    println!("  {:<16} {}", "input", dry.source.display());
    println!("  {:<16} {}", "output", destination.display());
    println!("  {:<16} {}", "target", request.target());
    println!("  {:<16} {}", "optimization", request.optimization_level());
    println!("  {:<16} {}", "format", request.output_format());
    println!("  {:<16} {}", "validation", yes_no(request.validation()));
    println!("  {:<16} {}", "benchmark", yes_no(request.benchmark()));
    if !request.target_features().is_empty() {
        println!(
            "  {:<16} {}",
            "target features",
            request.target_features().join(", ")
        );
    }
    println!("  {:<16} {}", "image", dry.plan.image);
    println!("\n{} {}", dry.plan.program, dry.plan.args.join(" "));
    Ok(())
}

fn print_report(report: &CompileReport, verbose: bool) {
    let result = &report.result;
    if result.success {
        println!("compilation completed in {:.2}s", result.elapsed.as_secs_f64());
        if let Some(output) = &result.output {
            println!("  output:     {} ({})", output.path.display(), output.size_formatted);
            println!("  blake3:     {}", output.blake3);
        }
        if let Some(dest) = &result.delivered_to {
            println!("  copied to:  {}", dest.display());
        }
        if let Some(validation) = &result.validation_result {
            println!("  validation: {validation}");
        }
        if let Some(bench) = &result.benchmark {
            if let Some(latency) = bench.latency_ms {
                println!("  latency:    {latency} ms");
            }
            if let Some(throughput) = bench.throughput_ops_per_sec {
                println!("  throughput: {throughput} ops/sec");
            }
        }
        for warning in &result.warnings {
            eprintln!("warning: {warning}");
        }
        if verbose && !result.log.is_empty() {
            println!("\ncontainer log:\n{}", result.log);
        }
    } else {
        let kind = result
            .failure
            .map_or_else(|| "failure".to_owned(), |k| k.to_string());
        eprintln!(
            "compilation failed ({kind}): {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        if let Some(output) = &result.output {
            eprintln!(
                "  artifact left at {} ({})",
                output.path.display(),
                format_size(output.size)
            );
        }
        if !result.log.is_empty() {
            eprintln!("\ncontainer log:\n{}", result.log);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ireedock_core::Settings;

    fn args(target: Target, features: &[&str]) -> CompileArgs {
        CompileArgs {
            input: PathBuf::from("/models/net.mlir"),
            output: PathBuf::from("out/net.vmfb"),
            target,
            optimization: OptimizationLevel::O3,
            target_features: features.iter().map(|f| (*f).to_owned()).collect(),
            format: OutputFormat::Vmfb,
            validate: true,
            benchmark: false,
            config: None,
            dry_run: false,
        }
    }

    fn engine() -> Engine {
        Engine::new(Settings {
            backend: "mock".to_owned(),
            ..Settings::default()
        })
    }

    #[test]
    fn feature_flags_are_checked_against_the_target() {
        let err = build_request(&engine(), &args(Target::Cuda, &["sm_80", "avx2"]), false)
            .unwrap_err();
        let CoreError::Config(config) = &err else {
            panic!("expected config error, got {err}");
        };
        let report = config.report().unwrap();
        assert_eq!(report.violations().len(), 1);
        assert_eq!(report.violations()[0].field, "target_features");
        assert!(err.to_string().contains("avx2"));
    }

    #[test]
    fn flags_build_a_rooted_request() {
        let request =
            build_request(&engine(), &args(Target::Cpu, &["sse2", "avx2"]), true).unwrap();
        assert_eq!(request.input_path(), "/input/net.mlir");
        assert_eq!(request.target_features(), ["avx2", "sse2"]);
        assert!(request.verbose());
    }
}
