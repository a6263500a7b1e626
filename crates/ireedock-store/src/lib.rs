//! Secure file staging for ireedock compilations.
//!
//! This crate owns every host-side file a compilation touches: the
//! `StagingLayout` directory structure, the `Stager` that validates untrusted
//! IR inputs and copies them under sanitized, collision-free names, output
//! reservation and post-run verification, streaming blake3 hashing, scoped
//! scratch directories, and file inspection helpers.

pub mod hash;
pub mod info;
pub mod layout;
pub mod sanitize;
pub mod scratch;
pub mod stager;

pub use hash::hash_file;
pub use info::{file_info, format_size, FileInfo};
pub use layout::StagingLayout;
pub use sanitize::sanitize_filename;
pub use scratch::with_temp_dir_in;
pub use stager::{
    validate_input, verify_output, OutputInfo, StagedFile, Stager, MAX_INPUT_SIZE, SNIFF_LEN,
};

use std::path::PathBuf;
use thiserror::Error;

/// Why an input could not be staged. Always raised before any container runs.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("input file does not exist: {0}")]
    NotFound(PathBuf),
    #[error("input path is not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("input file must have the {expected} extension: {path}")]
    WrongExtension { path: PathBuf, expected: String },
    #[error("input file too large: {size} bytes (max: {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("input file is not valid UTF-8 text: {0}")]
    NotText(PathBuf),
    #[error("input file does not look like an MLIR program: {0}")]
    NotIr(PathBuf),
    #[error("no free staging name for '{0}'")]
    NamesExhausted(String),
}

/// Why a produced artifact was rejected after the container exited.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("output file was not created: {0}")]
    Missing(PathBuf),
    #[error("output path is not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("output file is empty: {0}")]
    Empty(PathBuf),
    #[error("output file extension does not match format: expected {expected}")]
    WrongExtension { expected: String },
    #[error("output file too small to be a valid {format} module ({size} bytes)")]
    HeaderTooShort { format: String, size: u64 },
    #[error("error reading output file: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_error_display_too_large() {
        let e = StagingError::TooLarge {
            size: 200,
            limit: 100,
        };
        let msg = e.to_string();
        assert!(msg.contains("200"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn staging_error_display_extension() {
        let e = StagingError::WrongExtension {
            path: PathBuf::from("/tmp/model.txt"),
            expected: ".mlir".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".mlir"));
        assert!(msg.contains("model.txt"));
    }

    #[test]
    fn verification_error_display_missing() {
        let e = VerificationError::Missing(PathBuf::from("/out/model.vmfb"));
        assert!(e.to_string().contains("/out/model.vmfb"));
    }

    #[test]
    fn verification_error_display_header() {
        let e = VerificationError::HeaderTooShort {
            format: "vmfb".to_owned(),
            size: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("vmfb"));
        assert!(msg.contains('3'));
    }
}
