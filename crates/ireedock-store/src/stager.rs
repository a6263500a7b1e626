use ireedock_schema::{OutputFormat, IR_EXTENSION};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::hash::hash_file;
use crate::layout::{set_mode, StagingLayout};
use crate::sanitize::{candidate_name, sanitize_filename, split_extension, with_extension};
use crate::scratch::remove_dir_logged;
use crate::{StagingError, VerificationError};

/// Largest input program accepted for staging.
pub const MAX_INPUT_SIZE: u64 = 100 * 1024 * 1024;

/// How much of the input is inspected by the content sniff.
pub const SNIFF_LEN: usize = 1024;

const IR_KEYWORDS: &[&str] = &["module", "func", "stablehlo"];
const DEFAULT_OUTPUT_STEM: &str = "model";
const MAX_SUFFIX: u32 = 10_000;

/// Bytes read when checking an artifact header.
const HEADER_LEN: u64 = 16;
const MIN_HEADER_LEN: u64 = 4;

/// An input program copied into the staging area.
#[derive(Debug, Clone)]
pub struct StagedFile {
    source: PathBuf,
    path: PathBuf,
    name: String,
    suffix: u32,
    size: u64,
    hash: OnceLock<String>,
}

impl StagedFile {
    /// Where the file was copied from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Host path of the staged copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sanitized file name inside the input directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collision counter used to pick the name; 0 when the plain name was free.
    pub fn suffix(&self) -> u32 {
        self.suffix
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// blake3 of the staged copy, computed on first use.
    pub fn hash(&self) -> io::Result<&str> {
        if let Some(h) = self.hash.get() {
            return Ok(h);
        }
        let digest = hash_file(&self.path)?;
        Ok(self.hash.get_or_init(|| digest))
    }
}

/// A produced artifact that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub path: PathBuf,
    pub size: u64,
    pub blake3: String,
}

impl fmt::Display for OutputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output file valid: {} bytes", self.size)
    }
}

/// Check that `path` is a plausible IR program before it is staged.
///
/// Rejects missing paths, non-regular files, a wrong extension, files above
/// [`MAX_INPUT_SIZE`], and content whose first [`SNIFF_LEN`] bytes are not
/// UTF-8 or mention none of the IR structural keywords.
pub fn validate_input(path: &Path) -> Result<(), StagingError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StagingError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(StagingError::NotAFile(path.to_path_buf()));
    }

    let has_ir_extension = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(IR_EXTENSION.trim_start_matches('.')));
    if !has_ir_extension {
        return Err(StagingError::WrongExtension {
            path: path.to_path_buf(),
            expected: IR_EXTENSION.to_owned(),
        });
    }

    if meta.len() > MAX_INPUT_SIZE {
        return Err(StagingError::TooLarge {
            size: meta.len(),
            limit: MAX_INPUT_SIZE,
        });
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    let text = match std::str::from_utf8(&head) {
        Ok(t) => t,
        // The window may end in the middle of a multi-byte character.
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return Err(StagingError::NotText(path.to_path_buf())),
    };
    if !IR_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Err(StagingError::NotIr(path.to_path_buf()));
    }
    Ok(())
}

/// Verify an artifact the container claims to have produced.
///
/// The vmfb header check only requires [`MIN_HEADER_LEN`] readable bytes; it
/// does not inspect magic values.
pub fn verify_output(path: &Path, format: OutputFormat) -> Result<OutputInfo, VerificationError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(VerificationError::Missing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(VerificationError::NotAFile(path.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(VerificationError::Empty(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !name.ends_with(format.extension()) {
        return Err(VerificationError::WrongExtension {
            expected: format.extension().to_owned(),
        });
    }

    if format == OutputFormat::Vmfb {
        let mut header = Vec::with_capacity(16);
        File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
        let read = header.len() as u64;
        if read < MIN_HEADER_LEN {
            return Err(VerificationError::HeaderTooShort {
                format: format.to_string(),
                size: read,
            });
        }
    }

    Ok(OutputInfo {
        path: path.to_path_buf(),
        size: meta.len(),
        blake3: hash_file(path)?,
    })
}

fn request_stamp() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string()
}

/// Copy at most `limit` bytes of `source` into `dest`. A source that has
/// grown past `limit` since it was validated is rejected.
fn copy_capped(source: &Path, dest: &mut File, limit: u64) -> Result<u64, StagingError> {
    let mut src = File::open(source)?.take(limit + 1);
    let copied = io::copy(&mut src, dest)?;
    if copied > limit {
        let size = fs::metadata(source).map_or(copied, |m| m.len().max(copied));
        return Err(StagingError::TooLarge { size, limit });
    }
    Ok(copied)
}

/// Copies untrusted inputs into a [`StagingLayout`] and hands out output
/// locations inside it.
#[derive(Debug, Clone)]
pub struct Stager {
    layout: StagingLayout,
}

impl Stager {
    pub fn new(layout: StagingLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    pub fn validate_input(&self, path: &Path) -> Result<(), StagingError> {
        validate_input(path)
    }

    /// The id [`open_request`](Self::open_request) would take if called now.
    pub fn next_request_id(&self) -> String {
        let base = request_stamp();
        (0..MAX_SUFFIX)
            .map(|n| candidate_name(&base, n))
            .find(|id| !self.layout.request(id).root().exists())
            .unwrap_or(base)
    }

    /// Create a private area for one compilation and return a stager over it.
    ///
    /// The area is a complete layout under `requests/<id>/`, so a container
    /// given its `input/` and `output/` sees no other request's files.
    pub fn open_request(&self) -> Result<Stager, StagingError> {
        let parent = self.layout.requests_dir();
        fs::create_dir_all(&parent)?;
        set_mode(&parent, 0o755)?;

        let base = request_stamp();
        for n in 0..MAX_SUFFIX {
            let id = candidate_name(&base, n);
            match fs::create_dir(parent.join(&id)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
            let layout = self.layout.request(&id);
            layout.initialize()?;
            debug!("opened request area {}", layout.root().display());
            return Ok(Stager::new(layout));
        }
        Err(StagingError::NamesExhausted(base))
    }

    /// Remove staged inputs once no container needs them.
    pub fn discard_inputs(&self) {
        remove_dir_logged(&self.layout.input_dir());
    }

    /// Remove the whole staging root of this stager.
    pub fn discard(&self) {
        remove_dir_logged(self.layout.root());
    }

    /// Validate `source` and copy it into the input directory.
    ///
    /// The name comes from `desired_name` or the source's file name, is
    /// sanitized and forced to the IR extension. An existing staged file is
    /// never replaced: the next free `stem_N.mlir` is taken instead. The copy
    /// is made readable by the container user.
    pub fn stage_input(
        &self,
        source: &Path,
        desired_name: Option<&str>,
    ) -> Result<StagedFile, StagingError> {
        validate_input(source)?;

        let raw = desired_name.map_or_else(
            || {
                source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            },
            str::to_owned,
        );
        let base = with_extension(&sanitize_filename(&raw), IR_EXTENSION);

        let dir = self.layout.input_dir();
        fs::create_dir_all(&dir)?;

        for suffix in 0..MAX_SUFFIX {
            let name = candidate_name(&base, suffix);
            let path = dir.join(&name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            let size = match copy_capped(source, &mut file, MAX_INPUT_SIZE) {
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&path);
                    return Err(e);
                }
            };
            drop(file);
            set_mode(&path, 0o644)?;

            info!("staged {} as {name} ({size} bytes)", source.display());
            return Ok(StagedFile {
                source: source.to_path_buf(),
                path,
                name,
                suffix,
                size,
                hash: OnceLock::new(),
            });
        }
        Err(StagingError::NamesExhausted(base))
    }

    /// Pick a free output location for `format`.
    ///
    /// The name defaults to `model`; any known artifact extension on it is
    /// replaced by the one matching `format`. Nothing is created, so the
    /// caller must serialize reservations against the same staging root.
    pub fn reserve_output(
        &self,
        desired_name: Option<&str>,
        format: OutputFormat,
    ) -> Result<PathBuf, StagingError> {
        let sanitized = desired_name.map_or_else(|| DEFAULT_OUTPUT_STEM.to_owned(), sanitize_filename);
        let stem = match OutputFormat::from_file_name(&sanitized) {
            Some(_) => split_extension(&sanitized).0.to_owned(),
            None => sanitized,
        };
        let base = with_extension(&stem, format.extension());

        let dir = self.layout.output_dir();
        fs::create_dir_all(&dir)?;

        for suffix in 0..MAX_SUFFIX {
            let path = dir.join(candidate_name(&base, suffix));
            if !path.exists() {
                debug!("reserved output {}", path.display());
                return Ok(path);
            }
        }
        Err(StagingError::NamesExhausted(base))
    }

    pub fn verify_output(
        &self,
        path: &Path,
        format: OutputFormat,
    ) -> Result<OutputInfo, VerificationError> {
        verify_output(path, format)
    }
}
