//! Per-index writer lock.
//!
//! Builds and deletes of the same index are serialized with an exclusive
//! advisory lock on `<index_dir>/.locks/<name>.lock`. Readers never take it:
//! they only ever see committed snapshots.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use codesense_core::CodesenseError;
use fs2::FileExt;

/// Held for the duration of a build. Released on drop.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Wait for and take the lock at `path`.
///
/// # Errors
///
/// Returns [`CodesenseError::Io`] if the lock file cannot be created or locked.
pub async fn acquire(path: &Path) -> Result<BuildLock, CodesenseError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<BuildLock, CodesenseError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        file.lock_exclusive()?;
        let waited = start.elapsed();
        if waited.as_millis() > 100 {
            log::debug!("waited {waited:?} for {}", path.display());
        }
        Ok(BuildLock { file, path })
    })
    .await
    .map_err(|e| CodesenseError::Io(std::io::Error::other(format!("lock task failed: {e}"))))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".locks/demo.lock");

        let first = acquire(&path).await.unwrap();
        assert!(path.exists());

        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let waiter_path = path.clone();
        let waiter = tokio::spawn(async move {
            let _second = acquire(&waiter_path).await.unwrap();
            flag.load(Ordering::SeqCst)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        released.store(true, Ordering::SeqCst);
        drop(first);

        assert!(waiter.await.unwrap(), "second lock was granted before release");
    }
}
