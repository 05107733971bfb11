//! Scoped temporary files for in-memory image data.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// An image payload written to a uniquely named temporary file.
///
/// The file is deleted when the handle is dropped, including when the
/// invocation that used it fails. Use [`TempBlob::keep`] to opt out.
#[derive(Debug)]
pub struct TempBlob {
    file: NamedTempFile,
}

impl TempBlob {
    /// Write `data` to a fresh temp file and close the write side.
    pub fn materialize(data: &[u8]) -> io::Result<Self> {
        let mut file = tempfile::Builder::new().prefix("magick").tempfile()?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Persist the file past the lifetime of this handle and return its path.
    ///
    /// The caller becomes responsible for removing it.
    pub fn keep(self) -> io::Result<PathBuf> {
        self.file
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)
    }
}
