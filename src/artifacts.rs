//! Artifact identities, on-disk naming and the expiry sweeper.
//!
//! The artifact directory is the only state: whatever is on disk is what
//! exists, and age comes from file metadata, so nothing needs to survive a
//! restart. A finished artifact only ever appears under `{id}.mp3` once it is
//! complete; intermediates carry other suffixes and belong to a
//! [`PendingArtifact`] until then.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SynthesisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        ArtifactId(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 1] = [AudioFormat::Mp3];

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// A finished, compressed audio file for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub path: PathBuf,
    pub format: AudioFormat,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

impl Artifact {
    pub fn filename(&self) -> String {
        format!("{}.{}", self.id, self.format.extension())
    }
}

#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir)
            .await
            .map_err(|e| SynthesisError::fs(&store.dir, e))?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Waveform written by the engine.
    pub fn raw_path(&self, id: ArtifactId) -> PathBuf {
        self.dir.join(format!("{}.wav", id))
    }

    pub fn pitched_path(&self, id: ArtifactId) -> PathBuf {
        self.dir.join(format!("{}.pitched.wav", id))
    }

    /// Transcoder output before it is renamed into place.
    pub fn partial_path(&self, id: ArtifactId, format: AudioFormat) -> PathBuf {
        self.dir.join(format!("{}.{}.part", id, format.extension()))
    }

    pub fn artifact_path(&self, id: ArtifactId, format: AudioFormat) -> PathBuf {
        self.dir.join(format!("{}.{}", id, format.extension()))
    }

    /// Claims the files of a new request. They are removed when the returned
    /// guard is dropped without [`PendingArtifact::commit`].
    pub fn pending(self: &Arc<Self>, id: ArtifactId) -> PendingArtifact {
        PendingArtifact {
            store: Arc::clone(self),
            id,
            committed: false,
        }
    }

    /// Removes every file belonging to `id`, including a final artifact that
    /// was never handed out. Only unlinks, so it is safe to call from `Drop`.
    pub fn discard(&self, id: ArtifactId) {
        let mut paths = vec![self.raw_path(id), self.pitched_path(id)];
        for format in AudioFormat::ALL {
            paths.push(self.partial_path(id, format));
            paths.push(self.artifact_path(id, format));
        }
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }

    pub async fn sweep(&self, expiry: Duration) -> SweepReport {
        self.sweep_at(SystemTime::now(), expiry).await
    }

    /// Deletes every regular file older than `expiry` as seen from `now`.
    pub async fn sweep_at(&self, now: SystemTime, expiry: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Cleanup could not read {}: {}", self.dir.display(), e);
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("Cleanup stopped listing {}: {}", self.dir.display(), e);
                    break;
                }
            };
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => match meta.modified() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("No modification time for {}: {}", path.display(), e);
                        continue;
                    }
                },
                Ok(_) => continue,
                // Removed between listing and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Could not stat {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            report.scanned += 1;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= expiry {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Deleted expired artifact {}", path.display());
                    report.deleted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// The files of one in-flight request. Dropping it, whether on an error
/// path or because the request future was cancelled, removes everything the
/// request wrote.
#[derive(Debug)]
pub struct PendingArtifact {
    store: Arc<ArtifactStore>,
    id: ArtifactId,
    committed: bool,
}

impl PendingArtifact {
    /// Hands the finished artifact over to the store; from here on only the
    /// sweeper deletes it.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if !self.committed {
            self.store.discard(self.id);
        }
    }
}

/// Sweeps the store every `every` until `shutdown` flips. A slow sweep delays
/// the next tick rather than overlapping it.
pub async fn run_cleanup(
    store: Arc<ArtifactStore>,
    every: Duration,
    expiry: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        "Cleanup loop started for {} (every {:?}, expiry {:?})",
        store.dir().display(),
        every,
        expiry
    );
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let report = store.sweep(expiry).await;
                if report.deleted > 0 {
                    info!("Cleanup: deleted {} old audio files", report.deleted);
                }
                if report.failed > 0 {
                    warn!("Cleanup: {} files could not be removed", report.failed);
                }
            }
        }
    }
    info!("Cleanup loop stopped");
}

pub fn spawn_cleanup(
    store: Arc<ArtifactStore>,
    every: Duration,
    expiry: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_cleanup(store, every, expiry, shutdown))
}
