//! Atomic I/O operations with file locking

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Staging path used while writing `path`.
///
/// `registry.json` stages as `registry.tmp.json.<random>` in the same
/// directory so the final rename never crosses a filesystem boundary.
pub fn staging_path(path: &Path) -> PathBuf {
    let random = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &random[..12];
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.tmp.{}.{}", stem, ext.to_string_lossy(), suffix),
        None => format!("{}.tmp.{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename strategy to prevent partial writes.
/// Acquires an advisory lock on the staging file while it is written.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = staging_path(path);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    let written = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all());
    if let Err(e) = written {
        discard_staging(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    if let Err(e) = temp_file.unlock() {
        warn!(path = %path.display(), error = %e, "failed to release staging lock");
        discard_staging(&temp_path);
        return Err(Error::LockFailed {
            path: path.to_path_buf(),
        });
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        warn!(path = %path.display(), error = %e, "atomic rename failed");
        discard_staging(&temp_path);
        return Err(Error::io(path, e));
    }

    Ok(())
}

fn discard_staging(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path) {
        debug!(path = %temp_path.display(), error = %e, "failed to remove staging file");
    }
}

/// [`write_atomic`] off the async executor.
pub async fn write_atomic_async(path: PathBuf, content: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &content))
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Read text content from a file, mapping "not found" to `None`.
pub async fn read_text_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Modification time in milliseconds since the Unix epoch.
pub async fn modified_ms(path: &Path) -> Result<i64> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    let modified = meta.modified().map_err(|e| Error::io(path, e))?;
    let ms = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok(ms)
}
