//! Claimant persistence contract and its two implementations.
//!
//! The registry only needs "load the record for this id", "persist this
//! record" and "delete this record". [`RonFileStore`] keeps one RON file per
//! claimant; [`MemoryStore`] keeps everything in a map for tests and dry runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::record::{ClaimantKind, ClaimantRecord};

/// Errors surfaced by a [`ClaimStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("claim store I/O error on {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A record file could not be parsed.
    #[error("failed to parse claimant record {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: ron::error::SpannedError,
    },
    /// A record could not be serialized.
    #[error("failed to serialize claimant {id}: {source}")]
    Serialize {
        /// Claimant being written.
        id: Uuid,
        /// Underlying error.
        #[source]
        source: ron::Error,
    },
    /// The stored record belongs to the other claimant kind.
    #[error("record {id} is a {found:?}, expected {expected:?}")]
    KindMismatch {
        /// Claimant id.
        id: Uuid,
        /// Requested kind.
        expected: ClaimantKind,
        /// Kind found on disk.
        found: ClaimantKind,
    },
    /// Writes are disabled (used to exercise failure paths).
    #[error("claim store is read-only")]
    ReadOnly,
}

/// Persistence collaborator used by the claim registry.
pub trait ClaimStore: Send + Sync {
    /// Loads one record. `Ok(None)` means no record exists yet.
    fn load(&self, kind: ClaimantKind, id: Uuid) -> Result<Option<ClaimantRecord>, StoreError>;

    /// Persists one record, replacing any previous version.
    fn save(&self, record: &ClaimantRecord) -> Result<(), StoreError>;

    /// Removes one record. Removing a missing record succeeds.
    fn delete(&self, kind: ClaimantKind, id: Uuid) -> Result<(), StoreError>;

    /// Loads every record of `kind`. Used to discover towns at startup.
    fn load_all(&self, kind: ClaimantKind) -> Result<Vec<ClaimantRecord>, StoreError>;
}

fn check_kind(record: ClaimantRecord, expected: ClaimantKind) -> Result<ClaimantRecord, StoreError> {
    let found = record.kind();
    if found != expected {
        return Err(StoreError::KindMismatch {
            id: record.id,
            expected,
            found,
        });
    }
    Ok(record)
}

// ---------------------------------------------------------------------------
// RonFileStore
// ---------------------------------------------------------------------------

/// Stores each claimant as `<root>/<players|towns>/<uuid>.ron`.
#[derive(Debug, Clone)]
pub struct RonFileStore {
    root: PathBuf,
}

impl RonFileStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, kind: ClaimantKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    fn path(&self, kind: ClaimantKind, id: Uuid) -> PathBuf {
        self.dir(kind).join(format!("{id}.ron"))
    }

    fn read_record(path: &Path) -> Result<ClaimantRecord, StoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ClaimStore for RonFileStore {
    fn load(&self, kind: ClaimantKind, id: Uuid) -> Result<Option<ClaimantRecord>, StoreError> {
        let path = self.path(kind, id);
        if !path.exists() {
            return Ok(None);
        }
        let record = Self::read_record(&path)?;
        check_kind(record, kind).map(Some)
    }

    fn save(&self, record: &ClaimantRecord) -> Result<(), StoreError> {
        let dir = self.dir(record.kind());
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new().depth_limit(3);
        let serialized =
            ron::ser::to_string_pretty(record, pretty).map_err(|source| StoreError::Serialize {
                id: record.id,
                source,
            })?;

        // Write-then-rename: a crash never leaves a truncated record.
        let path = self.path(record.kind(), record.id);
        let tmp = path.with_extension("ron.tmp");
        std::fs::write(&tmp, serialized).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn delete(&self, kind: ClaimantKind, id: Uuid) -> Result<(), StoreError> {
        let path = self.path(kind, id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn load_all(&self, kind: ClaimantKind) -> Result<Vec<ClaimantRecord>, StoreError> {
        let dir = self.dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("ron") {
                continue;
            }
            // Corrupt files are skipped.
            match Self::read_record(&path).and_then(|record| check_kind(record, kind)) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!("skipping claimant record: {err}"),
            }
        }
        records.sort_by_key(|record| record.id);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store. Can be switched to read-only to simulate write failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(ClaimantKind, Uuid), ClaimantRecord>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` and `delete` fail with
    /// [`StoreError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Returns a copy of the stored record, if any.
    pub fn get(&self, kind: ClaimantKind, id: Uuid) -> Option<ClaimantRecord> {
        self.records.lock().get(&(kind, id)).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::Relaxed) {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl ClaimStore for MemoryStore {
    fn load(&self, kind: ClaimantKind, id: Uuid) -> Result<Option<ClaimantRecord>, StoreError> {
        Ok(self.get(kind, id))
    }

    fn save(&self, record: &ClaimantRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.records
            .lock()
            .insert((record.kind(), record.id), record.clone());
        Ok(())
    }

    fn delete(&self, kind: ClaimantKind, id: Uuid) -> Result<(), StoreError> {
        self.check_writable()?;
        self.records.lock().remove(&(kind, id));
        Ok(())
    }

    fn load_all(&self, kind: ClaimantKind) -> Result<Vec<ClaimantRecord>, StoreError> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .iter()
            .filter(|((record_kind, _), _)| *record_kind == kind)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }
}
