use crate::CoreError;
use ireedock_runtime::ImageConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SETTINGS_ENV: &str = "IREEDOCK_CONFIG";
pub const BACKEND_ENV: &str = "IREEDOCK_BACKEND";
pub const STAGING_ROOT_ENV: &str = "IREEDOCK_STAGING_ROOT";
pub const DEFAULT_BACKEND: &str = "docker";

/// Host-side runtime settings, read from `config.toml`.
///
/// ```toml
/// backend = "podman"
/// staging_root = "~/.local/share/ireedock/staging"
/// debug = false
///
/// [images]
/// repository = "iree-compiler"
/// tag = "latest"
/// build_root = "docker"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub backend: String,
    pub staging_root: PathBuf,
    pub debug: bool,
    pub images: ImageConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_owned(),
            staging_root: default_staging_root(),
            debug: false,
            images: ImageConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: Self = toml::from_str(&content)?;
        settings.staging_root = expand_tilde(&settings.staging_root);
        debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from `explicit`, else `$IREEDOCK_CONFIG`, else the default
    /// file if it exists, else built-in defaults. Environment overrides are
    /// applied last.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, CoreError> {
        let chosen = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from));
        let mut settings = match chosen {
            Some(path) => Self::load(&path)?,
            None => match default_settings_path() {
                Some(path) if path.is_file() => Self::load(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply `IREEDOCK_BACKEND` and `IREEDOCK_STAGING_ROOT` as seen by
    /// `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = lookup(BACKEND_ENV).filter(|v| !v.is_empty()) {
            self.backend = backend;
        }
        if let Some(root) = lookup(STAGING_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.staging_root = expand_tilde(Path::new(&root));
        }
    }
}

/// `~/.config/ireedock/config.toml`, when `HOME` is set.
pub fn default_settings_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/ireedock/config.toml"))
}

fn default_staging_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/share/ireedock/staging"),
        None => std::env::temp_dir().join("ireedock-staging"),
    }
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "backend = \"podman\"\nstaging_root = \"{}\"\ndebug = true\n\n\
                 [images]\nrepository = \"iree-compiler\"\ntag = \"20240101\"\nbuild_root = \"docker\"\n",
                dir.path().join("staging").display()
            ),
        )
        .unwrap();

        let mut expected = Settings {
            backend: "podman".to_owned(),
            staging_root: dir.path().join("staging"),
            debug: true,
            ..Settings::default()
        };
        expected.images.tag = "20240101".to_owned();
        assert_eq!(Settings::load(&path).unwrap(), expected);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = \"mock\"\n[images]\ntag = \"v2\"\n").unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.backend, "mock");
        assert_eq!(loaded.images.tag, "v2");
        assert_eq!(loaded.images.repository, "iree-compiler");
        assert!(!loaded.debug);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backnd = \"mock\"\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Settings(_)));
        assert!(err.to_string().starts_with("settings error:"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::discover(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn overrides_replace_backend_and_root() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| match key {
            BACKEND_ENV => Some("mock".to_owned()),
            STAGING_ROOT_ENV => Some("/srv/ireedock".to_owned()),
            _ => None,
        });
        assert_eq!(settings.backend, "mock");
        assert_eq!(settings.staging_root, PathBuf::from("/srv/ireedock"));
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(|_| Some(String::new()));
        assert_eq!(settings.backend, DEFAULT_BACKEND);
    }

    #[test]
    fn tilde_only_expands_leading_component() {
        assert_eq!(expand_tilde(Path::new("/a/~/b")), PathBuf::from("/a/~/b"));
        assert_eq!(expand_tilde(Path::new("rel")), PathBuf::from("rel"));
    }
}
