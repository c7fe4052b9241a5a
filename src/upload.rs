//! Uploaded bytes and their short-lived file on disk.
//!
//! PDFium opens documents by path, so every upload is written to a uniquely
//! named `invoice-*.pdf` file first. [`StagedUpload`] owns that file
//! exclusively; [`StagedUpload::release`] deletes it and consumes the value,
//! so it can only happen once. If a staged upload is dropped without being
//! released (a panic, a cancelled task), the drop deletes the file instead.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// An uploaded file held in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name as given by the client; informational only, never used as a path.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());
        Ok(Self { filename, bytes })
    }
}

/// The on-disk copy of an [`Upload`].
#[derive(Debug)]
pub struct StagedUpload {
    path: TempPath,
}

impl StagedUpload {
    /// Write `bytes` to a new temporary file, in `dir` or the system temp
    /// directory.
    pub fn create(bytes: &[u8], dir: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("invoice-").suffix(".pdf");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;
        let path = file.into_temp_path();
        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now.
    pub fn release(self) -> std::io::Result<()> {
        let shown: PathBuf = self.path.to_path_buf();
        let result = self.path.close();
        match &result {
            Ok(()) => debug!("Removed {}", shown.display()),
            Err(e) => warn!("Could not remove {}: {}", shown.display(), e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_file_has_prefix_suffix_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::create(b"%PDF-1.4", Some(dir.path())).unwrap();
        let name = staged.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("invoice-"), "got: {name}");
        assert!(name.ends_with(".pdf"), "got: {name}");
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn release_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::create(b"x", Some(dir.path())).unwrap();
        let path = staged.path().to_path_buf();
        staged.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::create(b"x", Some(dir.path())).unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagedUpload::create(b"a", Some(dir.path())).unwrap();
        let b = StagedUpload::create(b"b", Some(dir.path())).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn upload_from_path_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("acme-0042.pdf");
        std::fs::write(&p, b"%PDF").unwrap();
        let upload = Upload::from_path(&p).unwrap();
        assert_eq!(upload.filename, "acme-0042.pdf");
        assert_eq!(upload.bytes, b"%PDF");
    }
}
