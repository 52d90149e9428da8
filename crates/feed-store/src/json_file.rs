//! File-backed store: `<root>/<partition>/<id>.json`.

use std::path::{Path, PathBuf};

use serde_json::Value;

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::feed::Partition;

use crate::store::{check_id, RecordStore};

const EXTENSION: &str = "json";

/// Persists each record as a pretty-printed JSON file.
///
/// Writes go through a temporary file and a rename, so a crash leaves
/// either the old or the new record on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> VidfeedResult<Self> {
        let root = root.into();
        for partition in Partition::ALL {
            let dir = root.join(partition.as_str());
            std::fs::create_dir_all(&dir)
                .map_err(|e| VidfeedError::store(format!("cannot create {}: {e}", dir.display())))?;
        }
        tracing::debug!(root = %root.display(), "Record store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.as_str())
    }

    fn record_path(&self, partition: Partition, id: &str) -> PathBuf {
        self.partition_dir(partition).join(format!("{id}.{EXTENSION}"))
    }
}

impl RecordStore for JsonFileStore {
    fn put(&self, partition: Partition, id: &str, record: Value) -> VidfeedResult<()> {
        check_id(id)?;
        let dir = self.partition_dir(partition);
        std::fs::create_dir_all(&dir)?;

        let path = self.record_path(partition, id);
        let tmp = dir.join(format!(".{id}.{EXTENSION}.tmp"));
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::trace!(partition = partition.as_str(), id, "Record written");
        Ok(())
    }

    fn get_all(&self, partition: Partition) -> VidfeedResult<Vec<Value>> {
        let dir = self.partition_dir(partition);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'));
            if !hidden && path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(value) => records.push(value),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt record file");
                }
            }
        }
        Ok(records)
    }

    fn delete(&self, partition: Partition, id: &str) -> VidfeedResult<bool> {
        check_id(id)?;
        match std::fs::remove_file(self.record_path(partition, id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
