use crate::backend::ContainerBackend;
use crate::RuntimeError;
use ireedock_schema::Target;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const DEFAULT_REPOSITORY: &str = "iree-compiler";
pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_BUILD_ROOT: &str = "docker";

/// Where toolchain images come from and how they are named.
///
/// The image for a target is `<repository>:<target>-<tag>`; its local build
/// definition lives at `<build_root>/<target>/Dockerfile` and is built with
/// the parent of `build_root` as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    pub repository: String,
    pub tag: String,
    pub build_root: PathBuf,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            repository: DEFAULT_REPOSITORY.to_owned(),
            tag: DEFAULT_TAG.to_owned(),
            build_root: PathBuf::from(DEFAULT_BUILD_ROOT),
        }
    }
}

impl ImageConfig {
    pub fn image_ref(&self, target: Target) -> String {
        format!("{}:{target}-{}", self.repository, self.tag)
    }

    pub fn dockerfile(&self, target: Target) -> PathBuf {
        self.build_root.join(target.as_str()).join("Dockerfile")
    }

    pub fn build_context(&self) -> PathBuf {
        match self.build_root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Local,
    Pulled,
    Built,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedImage {
    pub reference: String,
    pub source: ImageSource,
}

/// Make the toolchain image for `target` available: use the local copy,
/// else pull it, else build it. Each step runs only when the previous one
/// failed; failing all three is an error naming every attempt.
pub fn ensure_image(
    backend: &dyn ContainerBackend,
    images: &ImageConfig,
    target: Target,
) -> Result<ResolvedImage, RuntimeError> {
    let reference = images.image_ref(target);
    let mut attempts = Vec::new();

    match backend.image_exists(&reference) {
        Ok(true) => {
            debug!("image {reference} found locally");
            return Ok(ResolvedImage {
                reference,
                source: ImageSource::Local,
            });
        }
        Ok(false) => attempts.push("not present locally".to_owned()),
        Err(e) => {
            warn!("could not inspect image {reference}: {e}");
            attempts.push(format!("inspect failed: {e}"));
        }
    }

    info!("pulling {reference}");
    match backend.pull_image(&reference) {
        Ok(()) => {
            return Ok(ResolvedImage {
                reference,
                source: ImageSource::Pulled,
            })
        }
        Err(e) => {
            info!("pull of {reference} failed: {e}");
            attempts.push(format!("pull failed: {e}"));
        }
    }

    let dockerfile = images.dockerfile(target);
    if !has_build_definition(images, target) {
        attempts.push(format!("no build definition at {}", dockerfile.display()));
        return Err(unavailable(reference, &attempts));
    }
    let context = images.build_context();
    info!("building {reference} from {}", dockerfile.display());
    match backend.build_image(&reference, &context, &dockerfile) {
        Ok(()) => Ok(ResolvedImage {
            reference,
            source: ImageSource::Built,
        }),
        Err(e) => {
            attempts.push(format!("build failed: {e}"));
            Err(unavailable(reference, &attempts))
        }
    }
}

fn unavailable(image: String, attempts: &[String]) -> RuntimeError {
    RuntimeError::ImageUnavailable {
        image,
        reason: attempts.join("; "),
    }
}

/// Whether a build definition exists for `target`.
pub fn has_build_definition(images: &ImageConfig, target: Target) -> bool {
    images.dockerfile(target).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn image_names_follow_target() {
        let cfg = ImageConfig::default();
        assert_eq!(cfg.image_ref(Target::Cuda), "iree-compiler:cuda-latest");
        assert_eq!(cfg.image_ref(Target::Metal), "iree-compiler:metal-latest");
        let custom = ImageConfig {
            repository: "ghcr.io/acme/iree".to_owned(),
            tag: "20.1".to_owned(),
            ..ImageConfig::default()
        };
        assert_eq!(custom.image_ref(Target::Cpu), "ghcr.io/acme/iree:cpu-20.1");
    }

    #[test]
    fn build_paths() {
        let cfg = ImageConfig::default();
        assert_eq!(cfg.dockerfile(Target::Vulkan), PathBuf::from("docker/vulkan/Dockerfile"));
        assert_eq!(cfg.build_context(), PathBuf::from("."));
        let abs = ImageConfig {
            build_root: PathBuf::from("/opt/ireedock/docker"),
            ..ImageConfig::default()
        };
        assert_eq!(abs.build_context(), PathBuf::from("/opt/ireedock"));
    }

    #[test]
    fn local_image_short_circuits() {
        let mock = MockBackend::new();
        let resolved = ensure_image(&mock, &ImageConfig::default(), Target::Cpu).unwrap();
        assert_eq!(resolved.source, ImageSource::Local);
        assert!(mock.pulls().is_empty());
    }

    #[test]
    fn pull_is_tried_before_build() {
        let mock = MockBackend::new().without_local_images();
        let resolved = ensure_image(&mock, &ImageConfig::default(), Target::Cuda).unwrap();
        assert_eq!(resolved.source, ImageSource::Pulled);
        assert_eq!(mock.pulls(), ["iree-compiler:cuda-latest"]);
        assert!(mock.builds().is_empty());
    }

    #[test]
    fn build_when_pull_fails() {
        let dir = tempfile::tempdir().unwrap();
        let build_root = dir.path().join("docker");
        std::fs::create_dir_all(build_root.join("cpu")).unwrap();
        std::fs::write(build_root.join("cpu/Dockerfile"), "FROM scratch\n").unwrap();
        let cfg = ImageConfig {
            build_root,
            ..ImageConfig::default()
        };
        assert!(has_build_definition(&cfg, Target::Cpu));

        let mock = MockBackend::new().without_local_images().with_pull(false);
        let resolved = ensure_image(&mock, &cfg, Target::Cpu).unwrap();
        assert_eq!(resolved.source, ImageSource::Built);
        assert_eq!(mock.builds(), ["iree-compiler:cpu-latest"]);
    }

    #[test]
    fn all_strategies_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ImageConfig {
            build_root: dir.path().join("docker"),
            ..ImageConfig::default()
        };
        let mock = MockBackend::new().without_local_images().with_pull(false);
        let err = ensure_image(&mock, &cfg, Target::Metal).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("iree-compiler:metal-latest"));
        assert!(msg.contains("pull failed"));
        assert!(msg.contains("no build definition"));
    }

    #[test]
    fn failed_build_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let build_root = dir.path().join("docker");
        std::fs::create_dir_all(build_root.join("cuda")).unwrap();
        std::fs::write(build_root.join("cuda/Dockerfile"), "FROM scratch\n").unwrap();
        let cfg = ImageConfig {
            build_root,
            ..ImageConfig::default()
        };
        let mock = MockBackend::new()
            .without_local_images()
            .with_pull(false)
            .with_build(false);
        let err = ensure_image(&mock, &cfg, Target::Cuda).unwrap_err();
        assert!(err.to_string().contains("build failed"));
    }
}
