//! Working directory of short-lived clip files.
//!
//! Every request reserves its own file name, derived from a random v4 UUID,
//! so concurrent requests never write the same path. Files leave the
//! directory either through [`ArtifactStore::discard`] when a request fails or
//! through [`ArtifactStore::evict_older_than`] once they are old enough.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::media::MediaKind;

/// A file name claimed for one request
#[derive(Debug, Clone)]
pub struct Reservation {
    /// 32 hex chars, 122 random bits
    pub id: String,

    /// Where the finished artifact must end up
    pub path: PathBuf,

    pub kind: MediaKind,
}

/// Outcome of one sweep over the working directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictionReport {
    /// File names that were deleted
    pub removed: Vec<String>,

    /// Files that were old enough but could not be deleted
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claim a fresh artifact path for `kind`, creating the working directory if needed
    pub async fn reserve(&self, kind: MediaKind) -> io::Result<Reservation> {
        tokio::fs::create_dir_all(&self.root).await?;

        loop {
            let id = Uuid::new_v4().simple().to_string();
            let path = self
                .root
                .join(format!("{}_{}.{}", id, kind.suffix(), kind.extension()));

            // A clash would need a repeated v4 id; never hand out a path that exists
            if tokio::fs::try_exists(&path).await? {
                continue;
            }

            tracing::debug!(id = %id, kind = %kind, "Reserved artifact path");
            return Ok(Reservation { id, path, kind });
        }
    }

    /// Delete every regular file whose modification time is older than `max_age`
    ///
    /// A missing working directory is an empty sweep. Per-file failures are
    /// logged and counted; they never stop the sweep.
    pub async fn evict_older_than(&self, max_age: Duration) -> io::Result<EvictionReport> {
        let mut report = EvictionReport::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Could not stat file during sweep: {}", e);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "No modification time available: {}", e);
                    continue;
                }
            };

            if modified >= cutoff {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("Cleaned up old file: {}", path.display());
                    report
                        .removed
                        .push(entry.file_name().to_string_lossy().into_owned());
                }
                // Someone else got there first
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Error removing file {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Best-effort delete; returns whether this call removed the file
    pub async fn delete_if_exists(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Remove the reserved file and any tool intermediates sharing its id prefix
    pub async fn discard(&self, reservation: &Reservation) -> usize {
        let mut removed = usize::from(self.delete_if_exists(&reservation.path).await);

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Could not scan working directory for leftovers: {}", e);
                }
                return removed;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with(&reservation.id)
                        && self.delete_if_exists(&entry.path()).await
                    {
                        removed += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Could not scan working directory for leftovers: {}", e);
                    break;
                }
            }
        }

        if removed > 0 {
            tracing::debug!(id = %reservation.id, removed, "Discarded partial artifact files");
        }
        removed
    }
}
