mod commands;

use clap::{Parser, Subcommand};
use commands::compile::CompileArgs;
use commands::exit_code_for;
use ireedock_core::{install_signal_handler, Engine, Settings};
use ireedock_schema::{OptimizationLevel, OutputFormat, Target};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "ireedock",
    version,
    about = "Compile MLIR programs with IREE inside sandboxed toolchain containers"
)]
struct Cli {
    /// Path to a settings TOML file (default: $IREEDOCK_CONFIG or ~/.config/ireedock/config.toml).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose output and debug logging.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable debug mode in the container and trace-level logging.
    #[arg(long, default_value_t = false, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile an MLIR program to a deployable module.
    Compile {
        /// Input MLIR file.
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the compiled module.
        #[arg(short, long)]
        output: PathBuf,
        /// Compilation target backend.
        #[arg(short, long, default_value_t = Target::Cuda)]
        target: Target,
        /// Optimization level.
        #[arg(long, default_value_t = OptimizationLevel::O3)]
        optimization: OptimizationLevel,
        /// Target feature flag (repeatable).
        #[arg(long = "target-features")]
        target_features: Vec<String>,
        /// Output module format.
        #[arg(long = "format", default_value_t = OutputFormat::Vmfb)]
        format: OutputFormat,
        /// Skip output validation inside the container.
        #[arg(long, default_value_t = false)]
        no_validate: bool,
        /// Run benchmarks after compiling.
        #[arg(long, default_value_t = false)]
        benchmark: bool,
        /// JSON request document (overrides the options above).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Show what would be run without staging or launching anything.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print or write an example request document for a target.
    GenerateConfig {
        /// Target to generate an example for.
        #[arg(short, long, default_value_t = Target::Cuda)]
        target: Target,
        /// Write the example to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a JSON request document.
    ValidateConfig {
        /// Request document to validate.
        #[arg(short, long)]
        config: PathBuf,
        /// Also print the normalized document.
        #[arg(long, default_value_t = false)]
        normalize: bool,
        /// Write the normalized document here (with --normalize).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show toolchain images and container engine status.
    Status {
        /// Only show this target.
        #[arg(short, long)]
        target: Option<Target>,
    },
}

fn load_engine(settings: Option<&std::path::Path>) -> Result<Engine, String> {
    let settings = Settings::discover(settings).map_err(|e| e.to_string())?;
    debug!(
        "backend {} staging at {}",
        settings.backend,
        settings.staging_root.display()
    );
    Ok(Engine::new(settings))
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("IREEDOCK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let json = cli.json;
    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            target,
            optimization,
            target_features,
            format,
            no_validate,
            benchmark,
            config,
            dry_run,
        } => load_engine(cli.settings.as_deref()).and_then(|engine| {
            let args = CompileArgs {
                input,
                output,
                target,
                optimization,
                target_features,
                format,
                validate: !no_validate,
                benchmark,
                config,
                dry_run,
            };
            commands::compile::run(&engine, &args, cli.verbose, cli.debug, json)
        }),
        Commands::GenerateConfig { target, output } => {
            commands::generate_config::run(target, output.as_deref())
        }
        Commands::ValidateConfig {
            config,
            normalize,
            output,
        } => commands::validate_config::run(&config, normalize, output.as_deref(), json),
        Commands::Status { target } => load_engine(cli.settings.as_deref())
            .and_then(|engine| commands::status::run(&engine, target, json)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
