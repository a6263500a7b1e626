use crate::backend::ContainerOutput;
use crate::client::RuntimeClient;
use crate::image::{ensure_image, ImageConfig, ResolvedImage};
use crate::markers::parse_markers;
use crate::result::{ExecutionResult, FailureKind};
use crate::sandbox::RunSpec;
use crate::RuntimeError;
use ireedock_schema::{CompilationConfig, CompilationRequest, Target, CONFIG_MOUNT};
use ireedock_store::{verify_output, with_temp_dir_in};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name of the request document inside the `/config` mount.
pub const CONFIG_FILE_NAME: &str = "compile_config.json";
const CONFIG_DIR_PREFIX: &str = "ireedock_cfg_";

/// What a run would do, without doing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub image: String,
    pub program: String,
    pub args: Vec<String>,
    pub document: CompilationConfig,
}

/// Runs compilation requests in sandboxed containers.
#[derive(Debug)]
pub struct Executor<'a> {
    client: &'a RuntimeClient,
    images: &'a ImageConfig,
    verbose: bool,
    debug: bool,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a RuntimeClient, images: &'a ImageConfig) -> Self {
        Self {
            client,
            images,
            verbose: false,
            debug: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn resolve_image(&self, target: Target) -> String {
        self.images.image_ref(target)
    }

    pub fn ensure_available(&self, target: Target) -> Result<ResolvedImage, RuntimeError> {
        ensure_image(self.client.backend()?, self.images, target)
    }

    fn run_spec(
        &self,
        image: &str,
        request: &CompilationRequest,
        input_dir: &Path,
        output_dir: &Path,
        config_dir: &Path,
    ) -> RunSpec {
        let flag = |on: bool| if on { "1" } else { "0" };
        RunSpec::compilation(image, input_dir, output_dir, config_dir)
            .with_env("CONFIG_FILE", format!("{CONFIG_MOUNT}/{CONFIG_FILE_NAME}"))
            .with_env("VERBOSE", flag(self.verbose || request.verbose()))
            .with_env("DEBUG", flag(self.debug))
    }

    /// The image, argument vector and config document a run would use.
    /// Nothing is resolved, written or launched.
    pub fn plan(
        &self,
        request: &CompilationRequest,
        staged_input: &Path,
        staged_output: &Path,
        config_dir: &Path,
    ) -> RunPlan {
        let (input_dir, input_name) = split(staged_input);
        let (output_dir, output_name) = split(staged_output);
        let image = self.resolve_image(request.target());
        let spec = self.run_spec(&image, request, &input_dir, &output_dir, config_dir);
        RunPlan {
            program: self.client.backend_name().to_owned(),
            args: spec.to_args(),
            document: request.container_document(&input_name, &output_name),
            image,
        }
    }

    /// Resolve the image, write the config document into a scratch
    /// directory under `scratch`, run the container and judge the result.
    ///
    /// Never fails: every problem ends up in the returned result.
    pub fn run(
        &self,
        request: &CompilationRequest,
        staged_input: &Path,
        staged_output: &Path,
        scratch: &Path,
    ) -> ExecutionResult {
        let image = match self.ensure_available(request.target()) {
            Ok(image) => image,
            Err(e) => return ExecutionResult::failed(FailureKind::ImageResolution, e.to_string()),
        };
        info!("running {} with image {}", request.input_name(), image.reference);

        let (input_dir, input_name) = split(staged_input);
        let (output_dir, output_name) = split(staged_output);
        let document = request.container_document(&input_name, &output_name);

        let started = Instant::now();
        let launched = with_temp_dir_in(scratch, CONFIG_DIR_PREFIX, |dir| {
            write_config(dir, &document)?;
            let spec = self.run_spec(&image.reference, request, &input_dir, &output_dir, dir);
            self.client.backend()?.run(&spec)
        });
        let elapsed = started.elapsed();

        match launched {
            Ok(output) => judge(request, staged_output, output, elapsed).with_image(image),
            Err(e) => {
                let mut result = ExecutionResult::failed(
                    FailureKind::Execution,
                    format!("container failed to start: {e}"),
                )
                .with_image(image);
                result.elapsed = elapsed;
                result
            }
        }
    }
}

fn judge(
    request: &CompilationRequest,
    staged_output: &Path,
    output: ContainerOutput,
    elapsed: Duration,
) -> ExecutionResult {
    let markers = parse_markers(&output.log);
    let mut result = ExecutionResult::pending(elapsed, output.log.clone());
    result.exit_code = output.exit_code;
    result.validation_result = markers.validation_result;
    result.benchmark = markers.benchmark;
    result.container_errors = markers.errors;

    if !output.succeeded() {
        let status = output.exit_code.map_or_else(
            || "container was terminated by a signal".to_owned(),
            |code| format!("container exited with status {code}"),
        );
        let message = match result.container_errors.first() {
            Some(first) => format!("{status}: {first}"),
            None => status,
        };
        result.fail(FailureKind::Execution, message);
        return result;
    }

    match verify_output(staged_output, request.output_format()) {
        Ok(info) => {
            debug!("{info}");
            result.output = Some(info.into());
        }
        Err(e) => {
            result.fail(FailureKind::OutputVerification, e.to_string());
            return result;
        }
    }

    if markers.success {
        result.success = true;
    } else {
        result.fail(
            FailureKind::Execution,
            "container exited without reporting SUCCESS",
        );
    }
    result
}

/// Copy a verified artifact to a caller-chosen location. A failed copy is
/// recorded as a warning; the result stays successful.
pub fn deliver(result: &mut ExecutionResult, destination: &Path) {
    if !result.success {
        return;
    }
    let Some(source) = result.output.as_ref().map(|o| o.path.clone()) else {
        return;
    };
    let target = if destination.is_dir() {
        match source.file_name() {
            Some(name) => destination.join(name),
            None => destination.to_path_buf(),
        }
    } else {
        destination.to_path_buf()
    };
    if target == source {
        result.delivered_to = Some(target);
        return;
    }

    let copied = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
    .and_then(|()| fs::copy(&source, &target));
    match copied {
        Ok(_) => {
            info!("copied output to {}", target.display());
            result.delivered_to = Some(target);
        }
        Err(e) => {
            warn!("failed to copy output to {}: {e}", target.display());
            result
                .warnings
                .push(format!("failed to copy output to {}: {e}", target.display()));
        }
    }
}

fn split(path: &Path) -> (PathBuf, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, name)
}

/// The container user differs from the host user, so the document must be
/// world-readable.
fn write_config(dir: &Path, document: &CompilationConfig) -> Result<(), RuntimeError> {
    let path = dir.join(CONFIG_FILE_NAME);
    fs::write(&path, document.to_json_pretty()?)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}
