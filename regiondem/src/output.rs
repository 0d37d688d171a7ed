//! Output artifacts.
//!
//! Files are staged in memory first and only written once every artifact
//! of a run exists. Each file goes through a temporary sibling that is
//! renamed into place, so a reader never sees a half-written raster.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{DemError, Result};

/// Write `bytes` to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_temp(path, bytes)?
        .persist(path)
        .map_err(|e| DemError::Io(e.error))?;
    Ok(())
}

/// Write `bytes` to a synced temporary sibling of `path`.
///
/// The temporary file is removed if it is dropped without being persisted.
fn write_temp(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// A set of files to be written together.
#[derive(Debug, Default)]
pub struct StagedOutputs {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl StagedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `bytes` for `path`.
    pub fn stage(&mut self, path: PathBuf, bytes: Vec<u8>) {
        self.files.push((path, bytes));
    }

    /// Paths in staging order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(p, _)| p.clone()).collect()
    }

    /// Write every staged file.
    ///
    /// All contents go to temporary files first; existing files are only
    /// replaced once every temporary file is written. If a rename still
    /// fails, files this call created are removed and files it replaced are
    /// left with their new content.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut prepared = Vec::with_capacity(self.files.len());
        for (path, bytes) in self.files {
            let temp = write_temp(&path, &bytes)?;
            prepared.push((path, temp, bytes.len()));
        }

        let mut written: Vec<(PathBuf, bool)> = Vec::with_capacity(prepared.len());
        for (path, temp, size) in prepared {
            let existed = path.exists();
            if let Err(e) = temp.persist(&path) {
                for (done, replaced) in &written {
                    if !replaced {
                        let _ = std::fs::remove_file(done);
                    }
                }
                return Err(DemError::Io(e.error));
            }
            tracing::info!(path = %path.display(), size, "Wrote output");
            written.push((path, existed));
        }
        Ok(written.into_iter().map(|(path, _)| path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("a.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        // No temporary files left behind.
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_commit_writes_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedOutputs::new();
        staged.stage(dir.path().join("a.tif"), vec![1]);
        staged.stage(dir.path().join("b.tif"), vec![2]);
        assert_eq!(staged.paths().len(), 2);

        let written = staged.commit().unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_failed_commit_keeps_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let previous = dir.path().join("dem.tif");
        std::fs::write(&previous, b"previous run").unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut staged = StagedOutputs::new();
        staged.stage(previous.clone(), b"new run".to_vec());
        staged.stage(blocker.join("bad.tif"), vec![2]);

        assert!(staged.commit().is_err());
        assert_eq!(std::fs::read(&previous).unwrap(), b"previous run");
        // The temporary file for dem.tif is gone too.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_commit_rolls_back_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed makes the second write fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut staged = StagedOutputs::new();
        staged.stage(dir.path().join("ok.tif"), vec![1]);
        staged.stage(blocker.join("bad.tif"), vec![2]);

        assert!(staged.commit().is_err());
        assert!(!dir.path().join("ok.tif").exists());
    }
}
