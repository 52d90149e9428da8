use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use vidfeed_common::error::VidfeedResult;
use vidfeed_feed_model::feed::Partition;

use crate::store::{check_id, RecordStore};

type Partitions = HashMap<Partition, BTreeMap<String, Value>>;

/// In-process store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: Mutex<Partitions>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Partitions> {
        self.partitions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, partition: Partition, id: &str, record: Value) -> VidfeedResult<()> {
        check_id(id)?;
        self.lock()
            .entry(partition)
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    fn get_all(&self, partition: Partition) -> VidfeedResult<Vec<Value>> {
        Ok(self
            .lock()
            .get(&partition)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, partition: Partition, id: &str) -> VidfeedResult<bool> {
        Ok(self
            .lock()
            .get_mut(&partition)
            .and_then(|records| records.remove(id))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{delete_record, get_record, get_records, put_record};
    use vidfeed_feed_model::feed::{FeedPost, Profile};
    use vidfeed_feed_model::generation::AspectRatio;

    #[test]
    fn partitions_are_independent() {
        let store = MemoryStore::new();
        store.put(Partition::FeedPosts, "x", serde_json::json!({"a": 1})).unwrap();
        store.put(Partition::Profiles, "x", serde_json::json!({"b": 2})).unwrap();

        assert_eq!(store.get_all(Partition::FeedPosts).unwrap().len(), 1);
        assert!(store.delete(Partition::FeedPosts, "x").unwrap());
        assert!(!store.delete(Partition::FeedPosts, "x").unwrap());
        assert_eq!(store.get_all(Partition::Profiles).unwrap().len(), 1);
        assert!(store.get_all(Partition::IntegrationConfigs).unwrap().is_empty());
    }

    #[test]
    fn typed_round_trip_replaces_by_id() {
        let store = MemoryStore::new();
        let mut post = FeedPost::pending("a fox in snow", "veo-fast", AspectRatio::Portrait, "720p");
        put_record(&store, &post).unwrap();
        post.mark_ready("blob:abc");
        put_record(&store, &post).unwrap();

        let posts: Vec<FeedPost> = get_records(&store).unwrap();
        assert_eq!(posts, vec![post.clone()]);
        assert_eq!(get_record::<FeedPost>(&store, &post.id).unwrap(), Some(post.clone()));

        assert!(delete_record::<FeedPost>(&store, &post.id).unwrap());
        assert!(get_records::<FeedPost>(&store).unwrap().is_empty());
    }

    #[test]
    fn unreadable_records_are_skipped() {
        let store = MemoryStore::new();
        store.put(Partition::Profiles, "broken", serde_json::json!({"id": 7})).unwrap();
        put_record(
            &store,
            &Profile {
                id: "me".into(),
                display_name: "Me".into(),
                avatar_uri: None,
            },
        )
        .unwrap();

        let profiles: Vec<Profile> = get_records(&store).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, "me");
    }

    #[test]
    fn get_all_is_ordered_by_id() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store.put(Partition::Profiles, id, serde_json::json!(id)).unwrap();
        }
        let values = store.get_all(Partition::Profiles).unwrap();
        assert_eq!(values, vec![serde_json::json!("a"), serde_json::json!("b"), serde_json::json!("c")]);
    }
}
