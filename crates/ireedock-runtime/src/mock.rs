use crate::backend::{ContainerBackend, ContainerOutput, ImageStatus, SystemInfo};
use crate::sandbox::RunSpec;
use crate::RuntimeError;
use ireedock_schema::{CONFIG_MOUNT, OUTPUT_MOUNT};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const MOCK_LOG: &str = "\
[mock] compiling
VALIDATION_RESULT: PASSED
SUCCESS
";
pub const MOCK_ARTIFACT: &[u8] = b"IREE\x00mock-module";

/// What the mock "toolchain" does when a container is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBehavior {
    pub exit_code: i32,
    pub log: String,
    /// Bytes written to the output file named in the config document.
    pub output: Option<Vec<u8>>,
    /// Fail as if the container could not be started at all.
    pub fail_to_start: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            exit_code: 0,
            log: MOCK_LOG.to_owned(),
            output: Some(MOCK_ARTIFACT.to_vec()),
            fail_to_start: false,
        }
    }
}

impl MockBehavior {
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    pub fn with_output(mut self, output: Option<&[u8]>) -> Self {
        self.output = output.map(<[u8]>::to_vec);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn failing_to_start() -> Self {
        Self {
            fail_to_start: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct MockState {
    all_local: bool,
    pull_ok: bool,
    build_ok: bool,
    behavior: MockBehavior,
    runs: Vec<RunSpec>,
    pulls: Vec<String>,
    builds: Vec<String>,
}

/// In-process backend for tests and `backend = "mock"`.
///
/// Reads the config document through the `/config` mount, exactly as a real
/// toolchain image would, and writes its artifact through the `/output`
/// mount. Clones share state, so a test can keep a handle after giving one
/// to a `RuntimeClient`.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                all_local: true,
                pull_ok: true,
                build_ok: true,
                behavior: MockBehavior::default(),
                runs: Vec::new(),
                pulls: Vec::new(),
                builds: Vec::new(),
            })),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_local_images(self) -> Self {
        self.update(|s| s.all_local = false)
    }

    pub fn with_pull(self, ok: bool) -> Self {
        self.update(|s| s.pull_ok = ok)
    }

    pub fn with_build(self, ok: bool) -> Self {
        self.update(|s| s.build_ok = ok)
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.update(|s| s.behavior = behavior)
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut s) = self.state.lock() {
            s.behavior = behavior;
        }
    }

    pub fn runs(&self) -> Vec<RunSpec> {
        self.state.lock().map(|s| s.runs.clone()).unwrap_or_default()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.pulls.clone()).unwrap_or_default()
    }

    pub fn builds(&self) -> Vec<String> {
        self.state.lock().map(|s| s.builds.clone()).unwrap_or_default()
    }

    fn update(self, f: impl FnOnce(&mut MockState)) -> Self {
        if let Ok(mut s) = self.state.lock() {
            f(&mut s);
        }
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }
}

/// Map an in-container path to the host through the spec's bind mounts.
fn host_path(spec: &RunSpec, mount: &str, container_path: &str) -> Option<PathBuf> {
    let rest = container_path.strip_prefix(mount)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    spec.mount(mount).map(|m| m.source.join(rest))
}

fn read_output_file(spec: &RunSpec) -> Result<PathBuf, RuntimeError> {
    let config_file = spec
        .env_var("CONFIG_FILE")
        .ok_or_else(|| RuntimeError::ExecFailed("CONFIG_FILE not set".to_owned()))?;
    let host_config = host_path(spec, CONFIG_MOUNT, config_file).ok_or_else(|| {
        RuntimeError::ExecFailed(format!("config file {config_file} is not under {CONFIG_MOUNT}"))
    })?;
    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&host_config)?)?;
    let output_file = doc
        .get("output_file")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| RuntimeError::ExecFailed("config has no output_file".to_owned()))?;
    host_path(spec, OUTPUT_MOUNT, output_file).ok_or_else(|| {
        RuntimeError::ExecFailed(format!("output file {output_file} is not under {OUTPUT_MOUNT}"))
    })
}

impl ContainerBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let s = self.lock()?;
        Ok(s.all_local || s.pulls.iter().chain(&s.builds).any(|i| i == image))
    }

    fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let mut s = self.lock()?;
        if !s.pull_ok {
            return Err(RuntimeError::CommandFailed {
                command: format!("mock pull {image}"),
                detail: "manifest unknown".to_owned(),
            });
        }
        s.pulls.push(image.to_owned());
        Ok(())
    }

    fn build_image(
        &self,
        image: &str,
        _context: &Path,
        dockerfile: &Path,
    ) -> Result<(), RuntimeError> {
        let mut s = self.lock()?;
        if !s.build_ok {
            return Err(RuntimeError::CommandFailed {
                command: format!("mock build -f {} -t {image}", dockerfile.display()),
                detail: "build step failed".to_owned(),
            });
        }
        s.builds.push(image.to_owned());
        Ok(())
    }

    fn run(&self, spec: &RunSpec) -> Result<ContainerOutput, RuntimeError> {
        spec.validate()?;
        let behavior = {
            let mut s = self.lock()?;
            s.runs.push(spec.clone());
            s.behavior.clone()
        };
        if behavior.fail_to_start {
            return Err(RuntimeError::ExecFailed(format!(
                "mock container for {} failed to start",
                spec.image
            )));
        }

        let output_path = read_output_file(spec)?;
        if let Some(bytes) = &behavior.output {
            std::fs::write(&output_path, bytes)?;
        }
        Ok(ContainerOutput {
            exit_code: Some(behavior.exit_code),
            log: behavior.log,
        })
    }

    fn image_status(&self, image: &str) -> Result<ImageStatus, RuntimeError> {
        if !self.image_exists(image)? {
            return Ok(ImageStatus::missing(image));
        }
        let digest = blake3::hash(format!("mock-image:{image}").as_bytes()).to_hex();
        Ok(ImageStatus {
            image: image.to_owned(),
            available: true,
            size: Some(1024 * 1024 * 1024),
            created: Some("1970-01-01T00:00:00Z".to_owned()),
            id: Some(digest.as_str()[..12].to_owned()),
        })
    }

    fn system_info(&self) -> Result<SystemInfo, RuntimeError> {
        Ok(SystemInfo {
            backend: "mock".to_owned(),
            server_version: "mock".to_owned(),
            total_memory: Some(8 * 1024 * 1024 * 1024),
            cpus: Some(4),
            operating_system: std::env::consts::OS.to_owned(),
            architecture: std::env::consts::ARCH.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(dir: &Path) -> RunSpec {
        let input = dir.join("input");
        let output = dir.join("output");
        let config = dir.join("config");
        for d in [&input, &output, &config] {
            std::fs::create_dir_all(d).unwrap();
        }
        std::fs::write(
            config.join("compile_config.json"),
            r#"{"input_file": "/input/m.mlir", "output_file": "/output/m.vmfb"}"#,
        )
        .unwrap();
        RunSpec::compilation("iree-compiler:cpu-latest", input, output, config)
            .with_env("CONFIG_FILE", "/config/compile_config.json")
    }

    #[test]
    fn run_writes_artifact_through_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        let out = mock.run(&prepared(dir.path())).unwrap();
        assert!(out.succeeded());
        assert!(out.log.contains("SUCCESS"));
        assert_eq!(
            std::fs::read(dir.path().join("output/m.vmfb")).unwrap(),
            MOCK_ARTIFACT
        );
        assert_eq!(mock.runs().len(), 1);
    }

    #[test]
    fn scripted_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new().with_behavior(
            MockBehavior::default()
                .with_exit_code(1)
                .with_output(None)
                .with_log("ERROR: boom\n"),
        );
        let out = mock.run(&prepared(dir.path())).unwrap();
        assert_eq!(out.exit_code, Some(1));
        assert!(!dir.path().join("output/m.vmfb").exists());
    }

    #[test]
    fn start_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new().with_behavior(MockBehavior::failing_to_start());
        assert!(mock.run(&prepared(dir.path())).is_err());
    }

    #[test]
    fn output_outside_mount_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let spec = prepared(dir.path());
        std::fs::write(
            dir.path().join("config/compile_config.json"),
            r#"{"output_file": "/output/../etc/x.vmfb"}"#,
        )
        .unwrap();
        assert!(MockBackend::new().run(&spec).is_err());
    }

    #[test]
    fn clones_share_state() {
        let mock = MockBackend::new().without_local_images();
        let handle = mock.clone();
        mock.pull_image("a:b").unwrap();
        assert_eq!(handle.pulls(), ["a:b"]);
        assert!(handle.image_exists("a:b").unwrap());
        assert!(!handle.image_exists("c:d").unwrap());
    }

    #[test]
    fn status_reports_presence() {
        let mock = MockBackend::new().without_local_images();
        assert!(!mock.image_status("x:y").unwrap().available);
        let status = MockBackend::new().image_status("x:y").unwrap();
        assert!(status.available);
        assert_eq!(status.id.unwrap().len(), 12);
    }
}
