use crate::concurrency::{shutdown_requested, StagingLock};
use crate::settings::Settings;
use crate::CoreError;
use ireedock_runtime::{
    check_container_prereqs, deliver, ExecutionResult, Executor, ImageStatus, MissingPrereq,
    RunPlan, RuntimeClient, SystemInfo,
};
use ireedock_schema::{parse_config_file, CompilationRequest, Target};
use ireedock_store::{file_info, validate_input, FileInfo, StagingLayout, Stager};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Per-invocation knobs that are not part of the request document.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Where to copy the verified artifact. `None` leaves it in staging.
    pub destination: Option<PathBuf>,
    pub verbose: bool,
    pub debug: bool,
}

/// Outcome of [`Engine::compile`]. The staged paths record where the run
/// happened; see [`Engine::compile`] for which of them survive it.
#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub target: Target,
    pub fingerprint: String,
    pub staged_input: PathBuf,
    pub input_blake3: String,
    pub reserved_output: PathBuf,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

impl CompileReport {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DryRun {
    pub source: PathBuf,
    pub staged_input: PathBuf,
    pub reserved_output: PathBuf,
    #[serde(flatten)]
    pub plan: RunPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub target: Target,
    #[serde(flatten)]
    pub image: ImageStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub backend: String,
    pub staging_root: PathBuf,
    /// Facts about the staging root directory; `exists` is false until the
    /// first compilation.
    pub staging: FileInfo,
    pub images: Vec<TargetStatus>,
    pub system: SystemInfo,
}

/// Central pipeline for ireedock compilations.
///
/// Owns the settings, the stager over the configured staging root, and the
/// runtime client. One engine serves any number of sequential compilations;
/// separate engines over the same staging root serialize on its lock file.
pub struct Engine {
    settings: Settings,
    stager: Stager,
    client: RuntimeClient,
    interrupted: fn() -> bool,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        let client = RuntimeClient::new(settings.backend.clone());
        Self::with_client(settings, client)
    }

    /// Use an existing client instead of the one named in `settings`.
    pub fn with_client(settings: Settings, client: RuntimeClient) -> Self {
        let stager = Stager::new(StagingLayout::new(&settings.staging_root));
        Self {
            settings,
            stager,
            client,
            interrupted: shutdown_requested,
        }
    }

    /// Replace the check consulted before each container launch.
    #[must_use]
    pub fn with_interrupt_check(mut self, check: fn() -> bool) -> Self {
        self.interrupted = check;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn client(&self) -> &RuntimeClient {
        &self.client
    }

    /// Parse, normalize and validate a request document.
    pub fn load_request(&self, path: &Path) -> Result<CompilationRequest, CoreError> {
        let config = parse_config_file(path)?;
        Ok(CompilationRequest::from_config(&config)?)
    }

    pub fn prerequisites(&self) -> Vec<MissingPrereq> {
        check_container_prereqs(self.client.backend_name())
    }

    fn executor(&self, request: &CompilationRequest, options: &CompileOptions) -> Executor<'_> {
        Executor::new(&self.client, &self.settings.images)
            .with_verbose(options.verbose || request.verbose())
            .with_debug(options.debug || self.settings.debug)
    }

    /// Stage `source`, run the container for `request`, and deliver the
    /// artifact.
    ///
    /// Each call works in its own request area under the staging root, and
    /// only that area's directories are mounted. The staged input is removed
    /// once the container has exited. The area is kept only when it holds a
    /// verified artifact that was not delivered elsewhere.
    ///
    /// Staging problems are returned as errors before anything runs. Once a
    /// container is involved, every failure is reported in the result.
    pub fn compile(
        &self,
        request: &CompilationRequest,
        source: &Path,
        options: &CompileOptions,
    ) -> Result<CompileReport, CoreError> {
        info!(
            "compiling {} for {} ({})",
            source.display(),
            request.target(),
            request.output_format()
        );
        let layout = self.stager.layout();
        std::fs::create_dir_all(layout.root())?;
        let _lock = StagingLock::acquire(&layout.lock_file())?;

        let area = self.stager.open_request()?;
        let outcome = self.compile_in(&area, request, source, options);
        match &outcome {
            Ok(report) if report.success() && report.result.delivered_to.is_none() => {
                area.discard_inputs();
            }
            _ => area.discard(),
        }
        outcome
    }

    fn compile_in(
        &self,
        area: &Stager,
        request: &CompilationRequest,
        source: &Path,
        options: &CompileOptions,
    ) -> Result<CompileReport, CoreError> {
        let staged = area.stage_input(source, Some(request.input_name()))?;
        let input_blake3 = staged.hash()?.to_owned();
        let output = area.reserve_output(Some(request.output_name()), request.output_format())?;
        let fingerprint = request.fingerprint()?;

        let result = if (self.interrupted)() {
            warn!("interrupt received; not launching the container");
            ExecutionResult::interrupted()
        } else {
            let mut result = self.executor(request, options).run(
                request,
                staged.path(),
                &output,
                &area.layout().scratch_dir(),
            );
            if let Some(destination) = &options.destination {
                deliver(&mut result, destination);
            }
            result
        };

        if result.success {
            info!("compilation succeeded in {:.2}s", result.elapsed.as_secs_f64());
        } else if let Some(error) = &result.error {
            warn!("compilation failed: {error}");
        }

        Ok(CompileReport {
            target: request.target(),
            fingerprint,
            staged_input: staged.path().to_path_buf(),
            input_blake3,
            reserved_output: output,
            result,
        })
    }

    /// What `compile` would do. The source is validated but nothing is
    /// staged, resolved or launched.
    pub fn plan(&self, request: &CompilationRequest, source: &Path) -> Result<DryRun, CoreError> {
        validate_input(source)?;
        let area = self.stager.layout().request(&self.stager.next_request_id());
        let staged_input = area.input_dir().join(request.input_name());
        let reserved_output = area.output_dir().join(request.output_name());
        let plan = self.executor(request, &CompileOptions::default()).plan(
            request,
            &staged_input,
            &reserved_output,
            &area.scratch_dir(),
        );
        Ok(DryRun {
            source: source.to_path_buf(),
            staged_input,
            reserved_output,
            plan,
        })
    }

    /// Image availability for each of `targets`, plus engine facts.
    pub fn status(&self, targets: &[Target]) -> Result<StatusReport, CoreError> {
        let backend = self.client.backend()?;
        let images = targets
            .iter()
            .map(|&target| {
                let image = self.settings.images.image_ref(target);
                let status = backend.image_status(&image).unwrap_or_else(|e| {
                    warn!("failed to inspect {image}: {e}");
                    ImageStatus::missing(&image)
                });
                TargetStatus {
                    target,
                    image: status,
                }
            })
            .collect();
        Ok(StatusReport {
            backend: backend.name().to_owned(),
            staging_root: self.settings.staging_root.clone(),
            staging: file_info(&self.settings.staging_root)?,
            images,
            system: backend.system_info()?,
        })
    }
}
