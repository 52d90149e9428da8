//! The store interface and typed helpers over it.

use serde_json::Value;

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::feed::{Partition, Record};

/// A key-value record store partitioned by record kind.
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record `id` in `partition`.
    fn put(&self, partition: Partition, id: &str, record: Value) -> VidfeedResult<()>;

    /// Every record of `partition`, ordered by id.
    fn get_all(&self, partition: Partition) -> VidfeedResult<Vec<Value>>;

    /// Remove the record `id`. Returns false when it did not exist.
    fn delete(&self, partition: Partition, id: &str) -> VidfeedResult<bool>;
}

/// Ids become file names, so they must be a single plain path segment.
pub(crate) fn check_id(id: &str) -> VidfeedResult<()> {
    let bad = id.is_empty()
        || id.starts_with('.')
        || id.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if bad {
        return Err(VidfeedError::store(format!("invalid record id {id:?}")));
    }
    Ok(())
}

pub fn put_record<R: Record>(store: &dyn RecordStore, record: &R) -> VidfeedResult<()> {
    let value = serde_json::to_value(record)?;
    store.put(R::PARTITION, record.id(), value)
}

/// Load every record of `R`'s partition. Entries that no longer match the
/// record schema are skipped with a warning.
pub fn get_records<R: Record>(store: &dyn RecordStore) -> VidfeedResult<Vec<R>> {
    let values = store.get_all(R::PARTITION)?;
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<R>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    partition = R::PARTITION.as_str(),
                    error = %e,
                    "Skipping unreadable record"
                );
            }
        }
    }
    Ok(records)
}

pub fn get_record<R: Record>(store: &dyn RecordStore, id: &str) -> VidfeedResult<Option<R>> {
    Ok(get_records::<R>(store)?.into_iter().find(|r| r.id() == id))
}

pub fn delete_record<R: Record>(store: &dyn RecordStore, id: &str) -> VidfeedResult<bool> {
    store.delete(R::PARTITION, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        assert!(check_id("post-1").is_ok());
        assert!(check_id("3f2a9c1e-0000-4000-8000-000000000000").is_ok());
    }

    #[test]
    fn rejects_path_like_ids() {
        for id in ["", ".", "..", "../etc", "a/b", "a\\b", ".hidden", "a\nb"] {
            assert!(
                matches!(check_id(id), Err(VidfeedError::Store { .. })),
                "{id:?} accepted"
            );
        }
    }
}
