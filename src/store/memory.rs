//! In-memory relationship store
//!
//! Backs dev mode and the engine test suite. Same guarded semantics as
//! the MongoDB store: conditional status updates are atomic per record,
//! joins serialize on the event entry, and thread creation converges on
//! the canonical pair key.

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::db::schemas::{
    thread_pair_key, AccessRequestDoc, AccessRequestStatus, ConnectionDoc, EventDoc,
    LegacyCompletionDoc, MembershipDoc, MembershipState, SyncDoc, SyncStatus, ThreadDoc,
    TripRequestDoc, TripRequestStatus,
};
use crate::store::{JoinOutcome, RelationshipStore, StoreError, SyncWrite};

/// In-memory implementation of [`RelationshipStore`]
#[derive(Default)]
pub struct MemoryRelationshipStore {
    connections: DashMap<ObjectId, ConnectionDoc>,
    syncs: DashMap<ObjectId, SyncDoc>,
    events: DashMap<ObjectId, EventDoc>,
    memberships: DashMap<(ObjectId, String), MembershipDoc>,
    access_requests: DashMap<ObjectId, AccessRequestDoc>,
    /// One pending request per (event, requester); the entry lock on this
    /// map is what makes the create path race-free.
    pending_requests: DashMap<(ObjectId, String), ObjectId>,
    trip_requests: DashMap<ObjectId, TripRequestDoc>,
    threads: DashMap<String, ThreadDoc>,
    legacy_completions: DashMap<(ObjectId, ObjectId), LegacyCompletionDoc>,
    /// When false, legacy mirror writes fail like a missing collection
    legacy_schema_present: AtomicBool,
    /// When set, the next guarded join fails like a store outage
    join_outage: AtomicBool,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self {
            legacy_schema_present: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Simulate the legacy mirror collection being absent
    pub fn drop_legacy_schema(&self) {
        self.legacy_schema_present.store(false, Ordering::SeqCst);
    }

    /// Make the next guarded join fail as if the store were unreachable
    pub fn induce_join_outage(&self) {
        self.join_outage.store(true, Ordering::SeqCst);
    }

    /// Number of legacy mirror records (test observability)
    pub fn legacy_completion_count(&self) -> usize {
        self.legacy_completions.len()
    }

    /// Number of threads (test observability)
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

fn touch(metadata: &mut crate::db::schemas::Metadata) {
    metadata.updated_at = Some(DateTime::now());
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn insert_connection(&self, mut doc: ConnectionDoc) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        doc._id = Some(id);
        self.connections.insert(id, doc);
        Ok(id)
    }

    async fn connection(&self, id: &ObjectId) -> Result<Option<ConnectionDoc>, StoreError> {
        Ok(self.connections.get(id).map(|r| r.value().clone()))
    }

    async fn insert_sync(&self, mut doc: SyncDoc) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        doc._id = Some(id);
        self.syncs.insert(id, doc);
        Ok(id)
    }

    async fn sync(&self, id: &ObjectId) -> Result<Option<SyncDoc>, StoreError> {
        Ok(self.syncs.get(id).map(|r| r.value().clone()))
    }

    async fn update_sync_status_if(
        &self,
        id: &ObjectId,
        expected: SyncStatus,
        next: SyncStatus,
        write: SyncWrite,
    ) -> Result<bool, StoreError> {
        let mut entry = match self.syncs.get_mut(id) {
            Some(e) => e,
            None => return Ok(false),
        };

        if entry.status != expected {
            return Ok(false);
        }

        entry.status = next;
        if let Some(ts) = write.completed_at {
            entry.completed_at = Some(ts);
        }
        if let Some(note) = write.note {
            entry.note = Some(note);
        }
        touch(&mut entry.metadata);
        Ok(true)
    }

    async fn insert_legacy_completion(&self, mut doc: LegacyCompletionDoc) -> Result<(), StoreError> {
        if !self.legacy_schema_present.load(Ordering::SeqCst) {
            return Err(StoreError::MissingSchema);
        }

        let key = (doc.connection_id, doc.sync_id);
        if self.legacy_completions.contains_key(&key) {
            return Err(StoreError::Duplicate);
        }

        doc._id = Some(ObjectId::new());
        doc.metadata.created_at = Some(DateTime::now());
        self.legacy_completions.insert(key, doc);
        Ok(())
    }

    async fn insert_event(&self, mut doc: EventDoc) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        doc._id = Some(id);
        self.events.insert(id, doc);
        Ok(id)
    }

    async fn event(&self, id: &ObjectId) -> Result<Option<EventDoc>, StoreError> {
        Ok(self.events.get(id).map(|r| r.value().clone()))
    }

    async fn join_event(
        &self,
        event_id: &ObjectId,
        principal: &str,
    ) -> Result<JoinOutcome, StoreError> {
        if self.join_outage.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "store operation timed out".to_string(),
            ));
        }

        // Holding the event entry serializes concurrent joins to it
        let mut event = self
            .events
            .get_mut(event_id)
            .ok_or(StoreError::NotFound)?;

        let key = (*event_id, principal.to_string());
        if self.memberships.contains_key(&key) {
            return Ok(JoinOutcome::AlreadyPresent);
        }

        let has_seat = event
            .capacity
            .map(|cap| event.attendee_count < cap)
            .unwrap_or(true);

        let state = if has_seat {
            event.attendee_count += 1;
            MembershipState::Joined
        } else {
            MembershipState::Waitlisted
        };

        self.memberships.insert(
            key,
            MembershipDoc::new(*event_id, principal.to_string(), state),
        );

        Ok(if has_seat {
            JoinOutcome::Joined
        } else {
            JoinOutcome::Waitlisted
        })
    }

    async fn leave_event(&self, event_id: &ObjectId, principal: &str) -> Result<bool, StoreError> {
        let mut event = self
            .events
            .get_mut(event_id)
            .ok_or(StoreError::NotFound)?;

        let key = (*event_id, principal.to_string());
        match self.memberships.remove(&key) {
            Some((_, membership)) => {
                if membership.state == MembershipState::Joined && event.attendee_count > 0 {
                    event.attendee_count -= 1;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn membership(
        &self,
        event_id: &ObjectId,
        principal: &str,
    ) -> Result<Option<MembershipDoc>, StoreError> {
        let key = (*event_id, principal.to_string());
        Ok(self.memberships.get(&key).map(|r| r.value().clone()))
    }

    async fn count_recent_joins(
        &self,
        principal: &str,
        since: DateTime,
    ) -> Result<u64, StoreError> {
        let count = self
            .memberships
            .iter()
            .filter(|entry| {
                entry.principal == principal
                    && entry
                        .metadata
                        .created_at
                        .map(|ts| ts >= since)
                        .unwrap_or(false)
            })
            .count();
        Ok(count as u64)
    }

    async fn insert_access_request(&self, mut doc: AccessRequestDoc) -> Result<ObjectId, StoreError> {
        use dashmap::mapref::entry::Entry;

        let key = (doc.event_id, doc.requester.clone());
        match self.pending_requests.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Duplicate),
            Entry::Vacant(slot) => {
                let id = ObjectId::new();
                doc._id = Some(id);
                self.access_requests.insert(id, doc);
                slot.insert(id);
                Ok(id)
            }
        }
    }

    async fn access_request(&self, id: &ObjectId) -> Result<Option<AccessRequestDoc>, StoreError> {
        Ok(self.access_requests.get(id).map(|r| r.value().clone()))
    }

    async fn pending_access_request(
        &self,
        event_id: &ObjectId,
        requester: &str,
    ) -> Result<Option<AccessRequestDoc>, StoreError> {
        let key = (*event_id, requester.to_string());
        let id = match self.pending_requests.get(&key) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.access_requests.get(&id).map(|r| r.value().clone()))
    }

    async fn update_access_request_status_if(
        &self,
        id: &ObjectId,
        expected: AccessRequestStatus,
        next: AccessRequestStatus,
    ) -> Result<bool, StoreError> {
        // Scope the record guard so the pending-pair cleanup below never
        // holds two locks at once.
        let resolved_key = {
            let mut entry = match self.access_requests.get_mut(id) {
                Some(e) => e,
                None => return Ok(false),
            };

            if entry.status != expected {
                return Ok(false);
            }

            entry.status = next;
            touch(&mut entry.metadata);

            (next != AccessRequestStatus::Pending)
                .then(|| (entry.event_id, entry.requester.clone()))
        };

        if let Some(key) = resolved_key {
            self.pending_requests.remove(&key);
        }
        Ok(true)
    }

    async fn withdraw_access_request(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let pending = match self.access_requests.get(id) {
            Some(e) => e.status == AccessRequestStatus::Pending,
            None => false,
        };
        if !pending {
            return Ok(false);
        }

        if let Some((_, doc)) = self.access_requests.remove(id) {
            self.pending_requests
                .remove(&(doc.event_id, doc.requester));
        }
        Ok(true)
    }

    async fn insert_trip_request(&self, mut doc: TripRequestDoc) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        doc._id = Some(id);
        self.trip_requests.insert(id, doc);
        Ok(id)
    }

    async fn trip_request(&self, id: &ObjectId) -> Result<Option<TripRequestDoc>, StoreError> {
        Ok(self.trip_requests.get(id).map(|r| r.value().clone()))
    }

    async fn update_trip_status_if(
        &self,
        id: &ObjectId,
        expected: TripRequestStatus,
        next: TripRequestStatus,
    ) -> Result<bool, StoreError> {
        let mut entry = match self.trip_requests.get_mut(id) {
            Some(e) => e,
            None => return Ok(false),
        };

        if entry.status != expected {
            return Ok(false);
        }

        entry.status = next;
        touch(&mut entry.metadata);
        Ok(true)
    }

    async fn ensure_thread(
        &self,
        owner: &str,
        requester: &str,
        trip_request_id: &ObjectId,
    ) -> Result<ObjectId, StoreError> {
        let key = thread_pair_key(owner, requester);
        let entry = self.threads.entry(key).or_insert_with(|| {
            let mut thread = ThreadDoc::new(owner, requester, *trip_request_id);
            thread._id = Some(ObjectId::new());
            thread
        });

        entry
            ._id
            .ok_or_else(|| StoreError::Backend("thread without id".to_string()))
    }

    async fn thread_for_pair(
        &self,
        owner: &str,
        requester: &str,
    ) -> Result<Option<ThreadDoc>, StoreError> {
        let key = thread_pair_key(owner, requester);
        Ok(self.threads.get(&key).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conditional_update_rejects_race_loser() {
        let store = MemoryRelationshipStore::new();
        let conn_id = ObjectId::new();
        let sync = SyncDoc::new(
            conn_id,
            "ana".into(),
            "berto".into(),
            Default::default(),
            None,
            None,
        );
        let id = store.insert_sync(sync).await.unwrap();

        let first = store
            .update_sync_status_if(&id, SyncStatus::Pending, SyncStatus::Accepted, SyncWrite::default())
            .await
            .unwrap();
        assert!(first);

        // Second writer observed pending but the record moved on
        let second = store
            .update_sync_status_if(&id, SyncStatus::Pending, SyncStatus::Declined, SyncWrite::default())
            .await
            .unwrap();
        assert!(!second);

        let stored = store.sync(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Accepted);
    }

    #[tokio::test]
    async fn test_join_waitlists_beyond_capacity() {
        let store = MemoryRelationshipStore::new();
        let event = EventDoc::new("host".into(), "Milonga Nocturna".into()).with_capacity(1);
        let event_id = store.insert_event(event).await.unwrap();

        assert_eq!(
            store.join_event(&event_id, "ana").await.unwrap(),
            JoinOutcome::Joined
        );
        assert_eq!(
            store.join_event(&event_id, "berto").await.unwrap(),
            JoinOutcome::Waitlisted
        );
        assert_eq!(
            store.join_event(&event_id, "ana").await.unwrap(),
            JoinOutcome::AlreadyPresent
        );

        let event = store.event(&event_id).await.unwrap().unwrap();
        assert_eq!(event.attendee_count, 1);
    }

    #[tokio::test]
    async fn test_one_pending_access_request_per_pair() {
        let store = MemoryRelationshipStore::new();
        let event_id = ObjectId::new();

        let first = store
            .insert_access_request(AccessRequestDoc::new(event_id, "ana".into(), None))
            .await
            .unwrap();
        let err = store
            .insert_access_request(AccessRequestDoc::new(event_id, "ana".into(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));

        // Resolving the pending request frees the pair for a fresh one
        assert!(store
            .update_access_request_status_if(
                &first,
                AccessRequestStatus::Pending,
                AccessRequestStatus::Declined,
            )
            .await
            .unwrap());
        assert!(store
            .pending_access_request(&event_id, "ana")
            .await
            .unwrap()
            .is_none());
        store
            .insert_access_request(AccessRequestDoc::new(event_id, "ana".into(), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_thread_converges() {
        let store = MemoryRelationshipStore::new();
        let trip_id = ObjectId::new();

        let a = store.ensure_thread("owner", "guest", &trip_id).await.unwrap();
        let b = store.ensure_thread("guest", "owner", &trip_id).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.thread_count(), 1);
    }

    #[tokio::test]
    async fn test_leave_releases_seat() {
        let store = MemoryRelationshipStore::new();
        let event = EventDoc::new("host".into(), "Practica".into()).with_capacity(2);
        let event_id = store.insert_event(event).await.unwrap();

        store.join_event(&event_id, "ana").await.unwrap();
        assert!(store.leave_event(&event_id, "ana").await.unwrap());
        assert!(!store.leave_event(&event_id, "ana").await.unwrap());

        let event = store.event(&event_id).await.unwrap().unwrap();
        assert_eq!(event.attendee_count, 0);
    }
}
