use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// A downloaded comic image on local disk.
///
/// The value owns the file: it is deleted exactly once, either by an
/// explicit [`DownloadedImage::remove`] (which reports failures) or, if
/// that never happens, when the value is dropped.
#[derive(Debug)]
pub struct DownloadedImage {
    path: PathBuf,
    removed: bool,
}

impl DownloadedImage {
    /// Write `bytes` to `path`, replacing any existing file.
    pub fn write(path: PathBuf, bytes: &[u8]) -> AppResult<Self> {
        if let Err(e) = fs::write(&path, bytes) {
            // don't leave a truncated image behind
            let _ = fs::remove_file(&path);
            return Err(AppError::filesystem(&path, e));
        }
        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(DownloadedImage {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now.
    pub fn remove(mut self) -> AppResult<()> {
        self.removed = true;
        fs::remove_file(&self.path).map_err(|e| AppError::filesystem(&self.path, e))?;
        log::debug!("Removed {}", self.path.display());
        Ok(())
    }
}

impl Drop for DownloadedImage {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}
