//! # Audit Store
//!
//! Persists a raw copy of every authenticated inbound body, one JSON file per
//! call, before anything else happens to the request. File names start with a
//! millisecond UTC timestamp followed by a per-process sequence number, so a
//! descending name sort is most-recent-first even within one millisecond. A
//! random suffix keeps writers from separate processes apart.
//!
//! Retention is a separate maintenance operation ([`FileAuditStore::prune`]),
//! run from the CLI or from the server's optional interval task.

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "webhook-";
const FILE_SUFFIX: &str = ".json";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Sink for raw inbound bodies
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Persist a raw body, returning where it was stored
    async fn persist(&self, raw: &Value) -> RelayResult<PathBuf>;
}

/// Directory-backed audit store
#[derive(Debug, Clone)]
pub struct FileAuditStore {
    dir: PathBuf,
}

impl FileAuditStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact names, most recent first
    pub async fn list(&self) -> RelayResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RelayError::persistence(format!(
                    "failed to read audit directory {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_artifact_name(name) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Read one artifact by name
    pub async fn read(&self, name: &str) -> RelayResult<Value> {
        if name.contains('/') || name.contains('\\') || name == ".." || !is_artifact_name(name) {
            return Err(RelayError::persistence(format!(
                "invalid audit artifact name: {}",
                name
            )));
        }

        let content = fs::read_to_string(self.dir.join(name)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Keep the `retain` most recent artifacts and delete the rest
    ///
    /// Returns the number of deleted artifacts. Running it again without new
    /// writes deletes nothing.
    pub async fn prune(&self, retain: usize) -> RelayResult<usize> {
        let names = self.list().await?;
        if names.len() <= retain {
            debug!(count = names.len(), retain, "Audit store within retention");
            return Ok(0);
        }

        let mut deleted = 0;
        for name in names.iter().skip(retain) {
            match fs::remove_file(self.dir.join(name)).await {
                Ok(()) => {
                    debug!(artifact = %name, "Deleted old audit artifact");
                    deleted += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(artifact = %name, error = %e, "Failed to delete audit artifact"),
            }
        }

        info!(deleted, retained = retain, "Pruned audit store");
        Ok(deleted)
    }
}

#[async_trait]
impl AuditRecorder for FileAuditStore {
    async fn persist(&self, raw: &Value) -> RelayResult<PathBuf> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            RelayError::persistence(format!(
                "failed to create audit directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.dir.join(artifact_name());
        let content = serde_json::to_string_pretty(raw)?;
        fs::write(&path, content).await?;

        debug!(path = %path.display(), "Stored audit artifact");
        Ok(path)
    }
}

fn artifact_name() -> String {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}{}-{:016x}-{:08x}{}",
        FILE_PREFIX,
        Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ"),
        sequence,
        rand::random::<u32>(),
        FILE_SUFFIX
    )
}

fn is_artifact_name(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
}
