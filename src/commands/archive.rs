//! Zip extraction shared by `dirs unzip` and `github-download`

use crate::pipeline::StepError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Extracts `src` into `dest`, returning the written files
///
/// Entries whose names would escape `dest` are skipped.
///
/// # Errors
///
/// Returns [`StepError::Io`] if the archive cannot be read or a file cannot
/// be written.
pub fn extract_zip(src: &Path, dest: &Path) -> Result<Vec<PathBuf>, StepError> {
    let file = File::open(src)
        .map_err(|e| StepError::Io(format!("cannot open {}: {e}", src.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| StepError::Io(format!("cannot read archive {}: {e}", src.display())))?;
    fs::create_dir_all(dest)?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| StepError::Io(format!("bad entry #{index} in {}: {e}", src.display())))?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!(entry = entry.name(), "Skipping zip entry outside destination");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
        }
        written.push(target);
    }

    tracing::debug!(archive = %src.display(), files = written.len(), "Extracted archive");
    Ok(written)
}

/// Runs [`extract_zip`] on the blocking pool
///
/// # Errors
///
/// Same as [`extract_zip`].
pub async fn extract_zip_async(src: PathBuf, dest: PathBuf) -> Result<Vec<PathBuf>, StepError> {
    tokio::task::spawn_blocking(move || extract_zip(&src, &dest))
        .await
        .map_err(|e| StepError::Io(format!("extraction task failed: {e}")))?
}
