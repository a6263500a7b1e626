use crate::RuntimeError;
use ireedock_schema::{CONFIG_MOUNT, INPUT_MOUNT, OUTPUT_MOUNT};
use serde::Serialize;
use std::path::PathBuf;

/// Numeric user the toolchain runs as inside the container.
pub const CONTAINER_USER: &str = "1000:1000";
pub const DEFAULT_MEMORY_MB: u64 = 4096;
pub const DEFAULT_CPUS: u32 = 1;
pub const DEFAULT_TMPFS_MB: u64 = 512;

/// Resource and privilege limits every compilation container is started
/// with. The fixed posture is the only constructible value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxPolicy {
    user: String,
    memory_mb: u64,
    cpus: u32,
    tmpfs_mb: u64,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            user: CONTAINER_USER.to_owned(),
            memory_mb: DEFAULT_MEMORY_MB,
            cpus: DEFAULT_CPUS,
            tmpfs_mb: DEFAULT_TMPFS_MB,
        }
    }
}

impl SandboxPolicy {
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn memory_mb(&self) -> u64 {
        self.memory_mb
    }

    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    pub fn tmpfs_mb(&self) -> u64 {
        self.tmpfs_mb
    }

    fn args(&self) -> Vec<String> {
        vec![
            "--user".to_owned(),
            self.user.clone(),
            "--read-only".to_owned(),
            "--tmpfs".to_owned(),
            format!("/tmp:rw,noexec,nosuid,size={}m", self.tmpfs_mb),
            "--memory".to_owned(),
            format!("{}m", self.memory_mb),
            "--cpus".to_owned(),
            self.cpus.to_string(),
            "--network".to_owned(),
            "none".to_owned(),
            "--cap-drop".to_owned(),
            "ALL".to_owned(),
            "--security-opt".to_owned(),
            "no-new-privileges".to_owned(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl BindMount {
    pub fn read_only(source: impl Into<PathBuf>, target: &str) -> Self {
        Self {
            source: source.into(),
            target: target.to_owned(),
            read_only: true,
        }
    }

    pub fn read_write(source: impl Into<PathBuf>, target: &str) -> Self {
        Self {
            source: source.into(),
            target: target.to_owned(),
            read_only: false,
        }
    }

    fn volume_arg(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{mode}", self.source.display(), self.target)
    }
}

/// A fully specified container launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSpec {
    pub image: String,
    pub mounts: Vec<BindMount>,
    pub env: Vec<(String, String)>,
    pub policy: SandboxPolicy,
}

impl RunSpec {
    /// Standard compilation layout: input read-only, output read-write, and
    /// the config document directory read-only, under the fixed policy.
    pub fn compilation(
        image: impl Into<String>,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image: image.into(),
            mounts: vec![
                BindMount::read_only(input_dir, INPUT_MOUNT),
                BindMount::read_write(output_dir, OUTPUT_MOUNT),
                BindMount::read_only(config_dir, CONFIG_MOUNT),
            ],
            env: Vec::new(),
            policy: SandboxPolicy::default(),
        }
    }

    pub fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_owned(), value.into()));
        self
    }

    pub fn mount(&self, target: &str) -> Option<&BindMount> {
        self.mounts.iter().find(|m| m.target == target)
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Reject specs that would weaken the sandbox: a policy other than the
    /// fixed one, or anything but the three mount points, each exactly once,
    /// with input and config read-only.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.image.is_empty() {
            return Err(RuntimeError::InvalidRunSpec("image is empty".to_owned()));
        }
        let fixed = SandboxPolicy::default();
        if self.policy != fixed {
            return Err(RuntimeError::InvalidRunSpec(format!(
                "sandbox policy differs from the fixed posture \
                 (user {}, {}m memory, {} cpus, {}m tmpfs)",
                fixed.user, fixed.memory_mb, fixed.cpus, fixed.tmpfs_mb
            )));
        }
        for (target, read_only) in [(INPUT_MOUNT, true), (OUTPUT_MOUNT, false), (CONFIG_MOUNT, true)]
        {
            let count = self.mounts.iter().filter(|m| m.target == target).count();
            if count != 1 {
                return Err(RuntimeError::InvalidRunSpec(format!(
                    "expected exactly one mount at {target}, found {count}"
                )));
            }
            if read_only && self.mount(target).is_some_and(|m| !m.read_only) {
                return Err(RuntimeError::InvalidRunSpec(format!(
                    "{target} must be mounted read-only"
                )));
            }
        }
        if let Some(extra) = self
            .mounts
            .iter()
            .find(|m| ![INPUT_MOUNT, OUTPUT_MOUNT, CONFIG_MOUNT].contains(&m.target.as_str()))
        {
            return Err(RuntimeError::InvalidRunSpec(format!(
                "unexpected mount at {}",
                extra.target
            )));
        }
        if let Some(bad) = self.mounts.iter().find(|m| m.source.to_string_lossy().contains(':')) {
            return Err(RuntimeError::InvalidRunSpec(format!(
                "mount source may not contain ':': {}",
                bad.source.display()
            )));
        }
        Ok(())
    }

    /// Arguments for `docker`/`podman`, starting with `run`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_owned(), "--rm".to_owned()];
        args.extend(self.policy.args());
        for m in &self.mounts {
            args.push("-v".to_owned());
            args.push(m.volume_arg());
        }
        for (k, v) in &self.env {
            args.push("-e".to_owned());
            args.push(format!("{k}={v}"));
        }
        args.push(self.image.clone());
        args
    }
}
