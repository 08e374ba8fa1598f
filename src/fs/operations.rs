use std::path::{Path, PathBuf};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};
use tracing::{debug, info};

/// Path of the temporary sibling used while replacing `path`.
pub fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|v| v.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the contents of `path` so that a crash at any moment leaves either the old or the new
/// contents on disk, never a mix. Data is forced to durable storage before returning.
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
    let tmp = temporary_path(path);

    let mut file = File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    sync_parent(path).await
}

/// The rename itself is only durable once the directory entry is flushed.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<(), io::Error> {
    let Some(parent) = path.parent().filter(|v| !v.as_os_str().is_empty()) else {
        return Ok(());
    };
    File::open(parent).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<(), io::Error> {
    Ok(())
}

/// Holds an exclusive lock on a file for as long as it lives. Used to guarantee a single tracker
/// writes the snapshot.
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    pub async fn acquire(path: PathBuf) -> Result<Self, io::Error> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        info!("Waiting for tracker lock {path:?}");
        file.lock_exclusive()?;
        debug!("Acquired tracker lock {path:?}");
        Ok(Self { file, path })
    }

    pub async fn release(self) -> Result<(), io::Error> {
        self.file.unlock_async().await?;
        debug!("Released tracker lock {:?}", self.path);
        Ok(())
    }
}
