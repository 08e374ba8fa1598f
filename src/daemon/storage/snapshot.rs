use std::{
    future::Future,
    io::{self, ErrorKind},
    ops::Deref,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fs::operations::write_atomically;

use super::entities::ActivityStore;

pub const SNAPSHOT_FILE_NAME: &str = "activity_data.json";
const READ_ATTEMPTS: u32 = 3;
const READ_RETRY_PAUSE: Duration = Duration::from_millis(200);

/// How a snapshot came to be loaded. Lets the logs tell a first run from lost data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// There was no snapshot yet.
    Fresh,
    Restored,
    /// The snapshot existed but wasn't valid json. The original file is moved to `preserved_at`.
    Corrupt {
        reason: String,
        preserved_at: Option<PathBuf>,
    },
}

#[derive(Debug)]
pub struct LoadedStore {
    pub store: ActivityStore,
    pub outcome: LoadOutcome,
}

/// Interface for abstracting durable storage of the [ActivityStore].
pub trait SnapshotStorage {
    /// Missing or unparseable snapshots produce an empty store. Fails only when an existing
    /// snapshot can't be read at all, since starting empty would later overwrite its data.
    fn load(&self) -> impl Future<Output = Result<LoadedStore>>;

    /// Replaces the persisted snapshot with `store`.
    fn save(&self, store: &ActivityStore) -> impl Future<Output = Result<()>>;
}

impl<T: Deref> SnapshotStorage for T
where
    T::Target: SnapshotStorage,
{
    fn load(&self) -> impl Future<Output = Result<LoadedStore>> {
        self.deref().load()
    }

    fn save(&self, store: &ActivityStore) -> impl Future<Output = Result<()>> {
        self.deref().save(store)
    }
}

/// Stores the whole [ActivityStore] as one pretty printed json document.
pub struct JsonSnapshotStorage {
    path: PathBuf,
}

impl JsonSnapshotStorage {
    pub fn new(dir: &Path) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(SNAPSHOT_FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot without touching it. Used by commands that run next to a live tracker,
    /// so a broken file is reported instead of moved away.
    pub async fn read(&self) -> Result<ActivityStore> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Snapshot {:?} is corrupt", self.path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ActivityStore::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read snapshot {:?}", self.path)),
        }
    }

    /// Errors other than a missing file are retried a few times before giving up.
    async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match tokio::fs::read(&self.path).await {
                Err(e) if e.kind() != ErrorKind::NotFound && attempt < READ_ATTEMPTS => {
                    warn!("Failed to read snapshot {:?} ({e}), retrying", self.path);
                    attempt += 1;
                    tokio::time::sleep(READ_RETRY_PAUSE).await;
                }
                result => return result,
            }
        }
    }

    async fn preserve_corrupt(&self) -> Option<PathBuf> {
        let mut name = self.path.file_name()?.to_os_string();
        name.push(".corrupt");
        let target = self.path.with_file_name(name);
        match tokio::fs::rename(&self.path, &target).await {
            Ok(_) => Some(target),
            Err(e) => {
                warn!("Failed to preserve corrupt snapshot {:?}: {e}", self.path);
                None
            }
        }
    }
}

impl SnapshotStorage for JsonSnapshotStorage {
    async fn load(&self) -> Result<LoadedStore> {
        debug!("Loading snapshot {:?}", self.path);
        let bytes = match self.read_bytes().await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No snapshot at {:?}, starting fresh", self.path);
                return Ok(LoadedStore {
                    store: ActivityStore::default(),
                    outcome: LoadOutcome::Fresh,
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read snapshot {:?}", self.path))
            }
        };

        let reason = match serde_json::from_slice::<ActivityStore>(&bytes) {
            Ok(store) => {
                info!("Restored activity for {} days", store.days().count());
                return Ok(LoadedStore {
                    store,
                    outcome: LoadOutcome::Restored,
                });
            }
            Err(e) => format!("invalid json: {e}"),
        };

        let preserved_at = self.preserve_corrupt().await;
        warn!(
            "Snapshot {:?} is corrupt ({reason}), starting with no prior data. Preserved at {:?}",
            self.path, preserved_at
        );
        Ok(LoadedStore {
            store: ActivityStore::default(),
            outcome: LoadOutcome::Corrupt {
                reason,
                preserved_at,
            },
        })
    }

    async fn save(&self, store: &ActivityStore) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(store)?;
        write_atomically(&self.path, &bytes)
            .await
            .with_context(|| format!("Failed to write snapshot {:?}", self.path))
    }
}
