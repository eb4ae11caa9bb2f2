//! Scoped on-disk staging for converters that need file paths.
//!
//! The external office suite cannot read from a byte buffer: it takes an
//! input path and writes its output next to it. [`Staging`] owns a
//! [`TempDir`] for exactly one document's conversion attempt, so the
//! directory (and everything the external process scattered into it) is
//! removed when the value drops, on success, failure, timeout, and panic
//! alike. Nothing is shared between documents.

use crate::error::DocbindError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A per-conversion staging directory.
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Allocate a fresh staging directory.
    ///
    /// # Errors
    /// [`DocbindError::Resource`] when the directory cannot be created.
    pub fn create() -> Result<Self, DocbindError> {
        let dir = TempDir::new().map_err(|e| DocbindError::Resource {
            detail: "could not allocate staging directory".into(),
            source: e,
        })?;
        debug!("staging directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Write the input bytes under a fixed stem (`input.<ext>`), so the
    /// external tool's output path is predictable (`input.pdf`) and odd
    /// characters in the original file name never reach the shell.
    pub fn stage_input(&self, extension: &str, bytes: &[u8]) -> Result<PathBuf, DocbindError> {
        let path = self.dir.path().join(format!("input.{extension}"));
        std::fs::write(&path, bytes).map_err(|e| DocbindError::Resource {
            detail: format!("could not stage input at {}", path.display()),
            source: e,
        })?;
        Ok(path)
    }

    /// The staging directory path (used as the external tool's `--outdir`).
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the external tool is expected to leave its PDF.
    pub fn expected_output(&self) -> PathBuf {
        self.dir.path().join("input.pdf")
    }
}
