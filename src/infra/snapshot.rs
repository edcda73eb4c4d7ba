//! JSON snapshot file for the cache store.
//!
//! The file is a single JSON object mapping each key to
//! `{ "value": .., "metadata": { createdAt, expiresAt, lastAccessedAt, accessCount, sizeBytes, ttl } }`.
//! Timestamps are milliseconds since the Unix epoch and `ttl` is in milliseconds.
//! Keys are written least-recently-used first so a reload restores recency order.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::core::SnapshotError;

/// Entry metadata as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Insertion time.
    pub created_at: u64,
    /// Absolute expiry.
    pub expires_at: u64,
    /// Last successful read or write.
    pub last_accessed_at: u64,
    /// Number of accesses.
    pub access_count: u64,
    /// Estimated payload size.
    pub size_bytes: usize,
    /// TTL the entry was stored with.
    pub ttl: u64,
}

/// One persisted entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "V: Serialize"))]
#[serde(bound(deserialize = "V: DeserializeOwned"))]
pub struct SnapshotRecord<V> {
    /// Cached payload.
    pub value: V,
    /// Entry metadata.
    pub metadata: SnapshotMetadata,
}

/// Ordered key to record mapping, LRU first.
pub type Snapshot<V> = IndexMap<String, SnapshotRecord<V>>;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a snapshot, replacing the target file only once the new content is complete.
pub fn write_snapshot<V: Serialize>(path: &Path, snapshot: &Snapshot<V>) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, snapshot)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a snapshot. A missing file yields `Ok(None)`.
pub fn read_snapshot<V: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<V>>, SnapshotError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(expires_at: u64) -> SnapshotMetadata {
        SnapshotMetadata {
            created_at: 1,
            expires_at,
            last_accessed_at: 1,
            access_count: 1,
            size_bytes: 7,
            ttl: expires_at - 1,
        }
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let read: Option<Snapshot<String>> = read_snapshot(&dir.path().join("absent.json")).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn test_write_preserves_order_and_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut snapshot: Snapshot<String> = IndexMap::new();
        snapshot.insert("b".into(), SnapshotRecord { value: "second".into(), metadata: meta(10) });
        snapshot.insert("a".into(), SnapshotRecord { value: "first".into(), metadata: meta(20) });
        write_snapshot(&path, &snapshot).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"expiresAt\":10"));
        assert!(raw.contains("\"lastAccessedAt\""));
        assert!(!temp_path(&path).exists());

        let read: Snapshot<String> = read_snapshot(&path).unwrap().unwrap();
        let keys: Vec<_> = read.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(read["a"].metadata.expires_at, 20);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let read: Result<Option<Snapshot<String>>, _> = read_snapshot(&path);
        assert!(matches!(read, Err(SnapshotError::Serde(_))));
    }
}
