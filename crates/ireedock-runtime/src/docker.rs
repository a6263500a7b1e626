use crate::backend::{ContainerBackend, ContainerOutput, ImageStatus, SystemInfo};
use crate::sandbox::RunSpec;
use crate::RuntimeError;
use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

/// Drives the `docker` or `podman` command line. Both accept the same
/// subset of flags used here.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: &'static str,
}

impl CliBackend {
    pub fn docker() -> Self {
        Self { program: "docker" }
    }

    pub fn podman() -> Self {
        Self { program: "podman" }
    }

    pub fn program(&self) -> &str {
        self.program
    }

    fn output(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.program, args.join(" "));
        Ok(Command::new(self.program).args(args).output()?)
    }

    fn checked(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        let out = self.output(args)?;
        if out.status.success() {
            Ok(out)
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                detail: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            })
        }
    }
}

impl ContainerBackend for CliBackend {
    fn name(&self) -> &str {
        self.program
    }

    fn available(&self) -> bool {
        self.output(&["info", "--format", "{{json .}}"])
            .is_ok_and(|o| o.status.success())
    }

    fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.output(&["image", "inspect", image])?.status.success())
    }

    fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.checked(&["pull", image]).map(|_| ())
    }

    fn build_image(
        &self,
        image: &str,
        context: &Path,
        dockerfile: &Path,
    ) -> Result<(), RuntimeError> {
        let dockerfile = dockerfile.to_string_lossy();
        let context = context.to_string_lossy();
        self.checked(&["build", "--rm", "-t", image, "-f", &dockerfile, &context])
            .map(|_| ())
    }

    fn run(&self, spec: &RunSpec) -> Result<ContainerOutput, RuntimeError> {
        spec.validate()?;
        let args = spec.to_args();
        debug!("{} {}", self.program, args.join(" "));
        let out = Command::new(self.program).args(&args).output()?;

        let mut log = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.is_empty() {
            if !log.is_empty() && !log.ends_with('\n') {
                log.push('\n');
            }
            log.push_str(&stderr);
        }
        Ok(ContainerOutput {
            exit_code: out.status.code(),
            log,
        })
    }

    fn image_status(&self, image: &str) -> Result<ImageStatus, RuntimeError> {
        let out = self.output(&["image", "inspect", image])?;
        if !out.status.success() {
            return Ok(ImageStatus::missing(image));
        }
        let parsed: Value = serde_json::from_slice(&out.stdout)?;
        Ok(parse_image_inspect(image, &parsed))
    }

    fn system_info(&self) -> Result<SystemInfo, RuntimeError> {
        let out = self.checked(&["info", "--format", "{{json .}}"])?;
        let parsed: Value = serde_json::from_slice(&out.stdout)?;
        Ok(parse_system_info(self.program, &parsed))
    }
}

/// `image inspect` prints a one-element array.
pub(crate) fn parse_image_inspect(image: &str, doc: &Value) -> ImageStatus {
    let entry = doc.get(0).unwrap_or(doc);
    let id = entry.get("Id").and_then(Value::as_str).map(|id| {
        id.trim_start_matches("sha256:")
            .chars()
            .take(12)
            .collect::<String>()
    });
    ImageStatus {
        image: image.to_owned(),
        available: true,
        size: entry.get("Size").and_then(Value::as_u64),
        created: entry
            .get("Created")
            .and_then(Value::as_str)
            .map(str::to_owned),
        id,
    }
}

/// Docker reports flat keys; podman nests them under `host` and `version`.
pub(crate) fn parse_system_info(backend: &str, doc: &Value) -> SystemInfo {
    let text = |ptrs: &[&str]| {
        ptrs.iter()
            .find_map(|p| doc.pointer(p).and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_owned()
    };
    let number = |ptrs: &[&str]| ptrs.iter().find_map(|p| doc.pointer(p).and_then(Value::as_u64));

    SystemInfo {
        backend: backend.to_owned(),
        server_version: text(&["/ServerVersion", "/version/Version"]),
        total_memory: number(&["/MemTotal", "/host/memTotal"]),
        cpus: number(&["/NCPU", "/host/cpus"]),
        operating_system: text(&["/OperatingSystem", "/host/distribution/distribution"]),
        architecture: text(&["/Architecture", "/host/arch"]),
    }
}
