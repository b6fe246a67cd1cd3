//! Crash-safe file replacement
//!
//! Every write goes to a uniquely named temporary file in the destination
//! directory, is flushed to disk, and is then renamed over the destination.
//! Readers observe either the previous contents or the new contents, never a
//! partial write.

use crate::Result;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Suffix used for in-flight temporary files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Build the temporary sibling path used while writing `path`
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{}{}",
        file_name,
        Uuid::new_v4().simple(),
        TEMP_SUFFIX
    ))
}

/// Returns true for files left behind by an interrupted atomic write
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

/// Atomically replace `path` with `bytes`
///
/// The data is fsynced before the rename, and the parent directory is
/// fsynced afterwards (unix) so the rename itself survives a crash.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = temp_path_for(path);

    let write_result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = write_result {
        // Best effort: do not leave the temp file around
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    sync_parent_dir(path).await;
    Ok(())
}

/// Blocking variant of [`write_atomic`] for startup-time configuration writes
pub fn write_atomic_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp_path = temp_path_for(path);

    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, path)
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        match tokio::fs::File::open(parent).await {
            Ok(dir) => {
                if let Err(e) = dir.sync_all().await {
                    tracing::debug!(dir = %parent.display(), error = %e, "Directory fsync failed");
                }
            }
            Err(e) => {
                tracing::debug!(dir = %parent.display(), error = %e, "Directory open for fsync failed");
            }
        }
    }
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) {}
