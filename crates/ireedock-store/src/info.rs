use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

use crate::hash::hash_file;

/// Host-side facts about a file, as reported by `ireedock status` and the
/// compile summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub exists: bool,
    pub size: u64,
    pub size_formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Low three octal digits of the mode, e.g. `"644"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    pub is_file: bool,
    pub is_dir: bool,
    pub extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
}

impl FileInfo {
    fn missing() -> Self {
        Self {
            exists: false,
            size: 0,
            size_formatted: format_size(0),
            modified: None,
            permissions: None,
            is_file: false,
            is_dir: false,
            extension: String::new(),
            blake3: None,
        }
    }
}

/// Inspect `path`. A missing path is reported with `exists: false`, not as
/// an error; regular files are hashed.
pub fn file_info(path: &Path) -> io::Result<FileInfo> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileInfo::missing()),
        Err(e) => return Err(e),
    };

    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let blake3 = if meta.is_file() {
        Some(hash_file(path)?)
    } else {
        None
    };

    Ok(FileInfo {
        exists: true,
        size: meta.len(),
        size_formatted: format_size(meta.len()),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        permissions: permission_bits(&meta),
        is_file: meta.is_file(),
        is_dir: meta.is_dir(),
        extension,
        blake3,
    })
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:03o}", meta.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> Option<String> {
    None
}

/// Human-readable byte count with one decimal: `"0 B"`, `"512.0 B"`,
/// `"1.5 KB"`, `"100.0 MB"`.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(100 * 1024 * 1024), "100.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024 * 1024), "2048.0 TB");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let info = file_info(&dir.path().join("absent.vmfb")).unwrap();
        assert!(!info.exists);
        assert_eq!(info.size, 0);
        assert!(info.blake3.is_none());
    }

    #[test]
    fn regular_file_is_described() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.vmfb");
        fs::write(&path, b"IREE\x00\x01").unwrap();
        let info = file_info(&path).unwrap();
        assert!(info.exists);
        assert!(info.is_file);
        assert!(!info.is_dir);
        assert_eq!(info.size, 6);
        assert_eq!(info.size_formatted, "6.0 B");
        assert_eq!(info.extension, ".vmfb");
        assert_eq!(
            info.blake3.as_deref(),
            Some(blake3::hash(b"IREE\x00\x01").to_hex().as_str())
        );
        assert!(info.modified.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_three_octal_digits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mlir");
        fs::write(&path, "module {}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        assert_eq!(file_info(&path).unwrap().permissions.as_deref(), Some("640"));
    }

    #[test]
    fn directory_is_not_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let info = file_info(dir.path()).unwrap();
        assert!(info.is_dir);
        assert!(info.blake3.is_none());
    }

    #[test]
    fn serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.so");
        fs::write(&path, b"\x7fELF").unwrap();
        let json = serde_json::to_value(file_info(&path).unwrap()).unwrap();
        assert_eq!(json["size"], 4);
        assert_eq!(json["extension"], ".so");
        assert!(json["blake3"].is_string());
    }
}
