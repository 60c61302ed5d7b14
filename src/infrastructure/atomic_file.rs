//! Atomic file replacement
//!
//! Readers of the target path see either the old bytes or the new bytes,
//! never a partial write: content goes to a sibling temp file, is synced, and
//! is then renamed over the target.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::infrastructure::errors::{StoreError, StoreResult};

/// Sibling temp path used while writing `target`.
#[must_use]
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Replace `target` with `bytes` atomically.
pub async fn write_atomic(target: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = temp_path_for(target);
    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, target)
        .await
        .map_err(|e| StoreError::io(target, e))?;

    debug!("Atomically wrote {} bytes to {:?}", bytes.len(), target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn temp_path_is_a_sibling() {
        let tmp = temp_path_for(Path::new("/data/aiml2.json"));
        assert_eq!(tmp, PathBuf::from("/data/aiml2.json.tmp"));
    }

    #[tokio::test]
    async fn replaces_existing_content_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("grid.json");
        std::fs::write(&target, b"old").unwrap();

        write_atomic(&target, b"new content").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new content");
        assert!(!temp_path_for(&target).exists());
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/state/checkpoint.json");

        write_atomic(&target, b"{}").await.unwrap();

        assert!(target.exists());
    }
}
