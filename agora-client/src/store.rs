use std::{collections::HashMap, sync::Arc};

use crate::api::{CommentId, CommentRecord, PostId};

/// Comments known locally, keyed by id.
///
/// Records are only ever replaced wholesale, so a reader holding an
/// `Arc<CommentRecord>` never sees a half-updated record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentStore {
    records: Arc<HashMap<CommentId, Arc<CommentRecord>>>,
}

impl CommentStore {
    pub fn new() -> CommentStore {
        CommentStore::default()
    }

    /// Inserts the record, replacing any record with the same id
    pub fn upsert(&mut self, record: CommentRecord) -> Option<Arc<CommentRecord>> {
        Arc::make_mut(&mut self.records).insert(record.id, Arc::new(record))
    }

    /// Only meant for rolling back local-only records: comments deleted on the
    /// server stay in the store with `is_deleted` set
    pub fn remove(&mut self, id: CommentId) -> Option<Arc<CommentRecord>> {
        Arc::make_mut(&mut self.records).remove(&id)
    }

    pub fn get(&self, id: CommentId) -> Option<&Arc<CommentRecord>> {
        self.records.get(&id)
    }

    /// Returns the records of a post, in no particular order
    pub fn all_for_post(&self, post: PostId) -> Vec<Arc<CommentRecord>> {
        self.records
            .values()
            .filter(|c| c.post_id == post)
            .cloned()
            .collect()
    }

    pub fn contains_post(&self, post: PostId) -> bool {
        self.records.values().any(|c| c.post_id == post)
    }

    /// Drops every record of `post` and inserts `records` instead
    pub fn replace_post(&mut self, post: PostId, records: Vec<CommentRecord>) {
        let map = Arc::make_mut(&mut self.records);
        map.retain(|_, c| c.post_id != post);
        map.reserve(records.len());
        for r in records {
            if r.post_id != post {
                tracing::warn!(id = ?r.id, expected = ?post, got = ?r.post_id, "fetched comment belongs to another post");
            }
            map.insert(r.id, Arc::new(r));
        }
    }

    pub fn clear(&mut self) {
        Arc::make_mut(&mut self.records).clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
