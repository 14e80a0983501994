//! MongoDB-backed relationship store
//!
//! Conditional status updates are expressed as filters on the previously
//! observed status; the guarded join/leave/thread primitives lean on
//! unique indexes and conditional `$inc` writes so capacity and
//! duplicate races resolve inside the store. Every call is bounded by
//! the configured operation timeout; an elapsed timeout surfaces as a
//! retryable `Unavailable` failure.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::Collection;
use tracing::warn;

use crate::db::schemas::{
    AccessRequestDoc, AccessRequestStatus, ConnectionDoc, EventDoc, LegacyCompletionDoc,
    MembershipDoc, MembershipState, SyncDoc, SyncStatus, ThreadDoc, TripRequestDoc,
    TripRequestStatus, ACCESS_REQUEST_COLLECTION, CONNECTION_COLLECTION, EVENT_COLLECTION,
    LEGACY_COMPLETION_COLLECTION, MEMBERSHIP_COLLECTION, SYNC_COLLECTION, THREAD_COLLECTION,
    TRIP_REQUEST_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::store::{JoinOutcome, RelationshipStore, StoreError, SyncWrite};
use crate::types::CabeceoError;

/// Duplicate key error code from the server
const DUPLICATE_KEY_CODE: i32 = 11000;

/// NamespaceNotFound command error code
const NAMESPACE_NOT_FOUND_CODE: i32 = 26;

/// Classify a raw driver error into a typed store failure
fn classify(err: mongodb::error::Error) -> StoreError {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY_CODE => {
            StoreError::Duplicate
        }
        ErrorKind::Command(ce) if ce.code == NAMESPACE_NOT_FOUND_CODE => StoreError::MissingSchema,
        ErrorKind::Io(_) => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// MongoDB implementation of [`RelationshipStore`]
#[derive(Clone)]
pub struct MongoRelationshipStore {
    connections: MongoCollection<ConnectionDoc>,
    syncs: MongoCollection<SyncDoc>,
    events: MongoCollection<EventDoc>,
    memberships: MongoCollection<MembershipDoc>,
    access_requests: MongoCollection<AccessRequestDoc>,
    trip_requests: MongoCollection<TripRequestDoc>,
    threads: MongoCollection<ThreadDoc>,
    /// Raw handle: the legacy mirror's schema is owned elsewhere, so no
    /// index bootstrap happens here and its absence stays observable.
    legacy_completions: Collection<LegacyCompletionDoc>,
    op_timeout: Duration,
}

impl MongoRelationshipStore {
    /// Open all collections and apply schema indexes
    pub async fn new(client: &MongoClient, op_timeout: Duration) -> Result<Self, CabeceoError> {
        Ok(Self {
            connections: client.collection(CONNECTION_COLLECTION).await?,
            syncs: client.collection(SYNC_COLLECTION).await?,
            events: client.collection(EVENT_COLLECTION).await?,
            memberships: client.collection(MEMBERSHIP_COLLECTION).await?,
            access_requests: client.collection(ACCESS_REQUEST_COLLECTION).await?,
            trip_requests: client.collection(TRIP_REQUEST_COLLECTION).await?,
            threads: client.collection(THREAD_COLLECTION).await?,
            legacy_completions: client
                .inner()
                .database(client.db_name())
                .collection(LEGACY_COMPLETION_COLLECTION),
            op_timeout,
        })
    }

    /// Run a store future under the operation timeout
    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, mongodb::error::Error>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res.map_err(classify),
            Err(_) => Err(StoreError::Unavailable(
                "store operation timed out".to_string(),
            )),
        }
    }

    /// Filter matching an event that still has a free seat (or no
    /// capacity bound at all)
    fn seat_available_filter(event_id: &ObjectId) -> Document {
        doc! {
            "_id": *event_id,
            "metadata.is_deleted": { "$ne": true },
            "$or": [
                { "capacity": { "$exists": false } },
                { "capacity": Bson::Null },
                { "$expr": { "$lt": ["$attendee_count", "$capacity"] } },
            ],
        }
    }

    /// Release a seat previously reserved by a join that did not stick
    async fn release_seat(&self, event_id: &ObjectId) {
        let filter = doc! { "_id": *event_id, "attendee_count": { "$gt": 0 } };
        let update = doc! { "$inc": { "attendee_count": -1 } };
        if let Err(e) = self.bounded(self.events.update_one(filter, update)).await {
            warn!(event_id = %event_id, error = %e, "Failed to release reserved seat");
        }
    }
}

#[async_trait]
impl RelationshipStore for MongoRelationshipStore {
    async fn insert_connection(&self, doc: ConnectionDoc) -> Result<ObjectId, StoreError> {
        self.bounded(self.connections.insert_one(doc)).await
    }

    async fn connection(&self, id: &ObjectId) -> Result<Option<ConnectionDoc>, StoreError> {
        self.bounded(self.connections.find_one(doc! { "_id": *id }))
            .await
    }

    async fn insert_sync(&self, doc: SyncDoc) -> Result<ObjectId, StoreError> {
        self.bounded(self.syncs.insert_one(doc)).await
    }

    async fn sync(&self, id: &ObjectId) -> Result<Option<SyncDoc>, StoreError> {
        self.bounded(self.syncs.find_one(doc! { "_id": *id })).await
    }

    async fn update_sync_status_if(
        &self,
        id: &ObjectId,
        expected: SyncStatus,
        next: SyncStatus,
        write: SyncWrite,
    ) -> Result<bool, StoreError> {
        let filter = doc! {
            "_id": *id,
            "status": expected.as_str(),
            "metadata.is_deleted": { "$ne": true },
        };

        let mut set = doc! {
            "status": next.as_str(),
            "metadata.updated_at": DateTime::now(),
        };
        if let Some(ts) = write.completed_at {
            set.insert("completed_at", ts);
        }
        if let Some(note) = write.note {
            set.insert("note", note);
        }

        let result = self
            .bounded(self.syncs.update_one(filter, doc! { "$set": set }))
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn insert_legacy_completion(&self, mut doc: LegacyCompletionDoc) -> Result<(), StoreError> {
        doc.metadata.created_at = Some(DateTime::now());
        doc.metadata.updated_at = Some(DateTime::now());

        self.bounded(async {
            self.legacy_completions.insert_one(doc).await?;
            Ok(())
        })
        .await
    }

    async fn insert_event(&self, doc: EventDoc) -> Result<ObjectId, StoreError> {
        self.bounded(self.events.insert_one(doc)).await
    }

    async fn event(&self, id: &ObjectId) -> Result<Option<EventDoc>, StoreError> {
        self.bounded(self.events.find_one(doc! { "_id": *id })).await
    }

    async fn join_event(
        &self,
        event_id: &ObjectId,
        principal: &str,
    ) -> Result<JoinOutcome, StoreError> {
        // Reserve a seat with a single conditional write; losing the
        // capacity race means the joiner is waitlisted, not rejected.
        let reserved = self
            .bounded(self.events.update_one(
                Self::seat_available_filter(event_id),
                doc! { "$inc": { "attendee_count": 1 } },
            ))
            .await?
            .modified_count
            > 0;

        let state = if reserved {
            MembershipState::Joined
        } else {
            MembershipState::Waitlisted
        };
        let membership = MembershipDoc::new(*event_id, principal.to_string(), state);

        match self.bounded(self.memberships.insert_one(membership)).await {
            Ok(_) if reserved => Ok(JoinOutcome::Joined),
            Ok(_) => Ok(JoinOutcome::Waitlisted),
            Err(StoreError::Duplicate) => {
                // The unique (event, principal) index caught a duplicate
                // join; put the reserved seat back.
                if reserved {
                    self.release_seat(event_id).await;
                }
                Ok(JoinOutcome::AlreadyPresent)
            }
            Err(e) => {
                if reserved {
                    self.release_seat(event_id).await;
                }
                Err(e)
            }
        }
    }

    async fn leave_event(&self, event_id: &ObjectId, principal: &str) -> Result<bool, StoreError> {
        let filter = doc! { "event_id": *event_id, "principal": principal };
        let membership = match self.bounded(self.memberships.find_one(filter.clone())).await? {
            Some(m) => m,
            None => return Ok(false),
        };

        let removed = self
            .bounded(self.memberships.soft_delete(doc! {
                "event_id": *event_id,
                "principal": principal,
                "metadata.is_deleted": { "$ne": true },
            }))
            .await?
            .modified_count
            > 0;

        if removed && membership.state == MembershipState::Joined {
            self.release_seat(event_id).await;
        }

        Ok(removed)
    }

    async fn membership(
        &self,
        event_id: &ObjectId,
        principal: &str,
    ) -> Result<Option<MembershipDoc>, StoreError> {
        self.bounded(
            self.memberships
                .find_one(doc! { "event_id": *event_id, "principal": principal }),
        )
        .await
    }

    async fn count_recent_joins(
        &self,
        principal: &str,
        since: DateTime,
    ) -> Result<u64, StoreError> {
        self.bounded(self.memberships.count(doc! {
            "principal": principal,
            "metadata.created_at": { "$gte": since },
        }))
        .await
    }

    async fn insert_access_request(&self, doc: AccessRequestDoc) -> Result<ObjectId, StoreError> {
        self.bounded(self.access_requests.insert_one(doc)).await
    }

    async fn access_request(&self, id: &ObjectId) -> Result<Option<AccessRequestDoc>, StoreError> {
        self.bounded(self.access_requests.find_one(doc! { "_id": *id }))
            .await
    }

    async fn pending_access_request(
        &self,
        event_id: &ObjectId,
        requester: &str,
    ) -> Result<Option<AccessRequestDoc>, StoreError> {
        self.bounded(self.access_requests.find_one(doc! {
            "event_id": *event_id,
            "requester": requester,
            "status": AccessRequestStatus::Pending.as_str(),
        }))
        .await
    }

    async fn update_access_request_status_if(
        &self,
        id: &ObjectId,
        expected: AccessRequestStatus,
        next: AccessRequestStatus,
    ) -> Result<bool, StoreError> {
        let filter = doc! {
            "_id": *id,
            "status": expected.as_str(),
            "metadata.is_deleted": { "$ne": true },
        };
        let update = doc! { "$set": {
            "status": next.as_str(),
            "metadata.updated_at": DateTime::now(),
        }};

        let result = self
            .bounded(self.access_requests.update_one(filter, update))
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn withdraw_access_request(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let result = self
            .bounded(self.access_requests.soft_delete(doc! {
                "_id": *id,
                "status": AccessRequestStatus::Pending.as_str(),
                "metadata.is_deleted": { "$ne": true },
            }))
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn insert_trip_request(&self, doc: TripRequestDoc) -> Result<ObjectId, StoreError> {
        self.bounded(self.trip_requests.insert_one(doc)).await
    }

    async fn trip_request(&self, id: &ObjectId) -> Result<Option<TripRequestDoc>, StoreError> {
        self.bounded(self.trip_requests.find_one(doc! { "_id": *id }))
            .await
    }

    async fn update_trip_status_if(
        &self,
        id: &ObjectId,
        expected: TripRequestStatus,
        next: TripRequestStatus,
    ) -> Result<bool, StoreError> {
        let filter = doc! {
            "_id": *id,
            "status": expected.as_str(),
            "metadata.is_deleted": { "$ne": true },
        };
        let update = doc! { "$set": {
            "status": next.as_str(),
            "metadata.updated_at": DateTime::now(),
        }};

        let result = self
            .bounded(self.trip_requests.update_one(filter, update))
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn ensure_thread(
        &self,
        owner: &str,
        requester: &str,
        trip_request_id: &ObjectId,
    ) -> Result<ObjectId, StoreError> {
        let thread = ThreadDoc::new(owner, requester, *trip_request_id);
        let filter = doc! { "pair_key": &thread.pair_key };
        let update = doc! { "$setOnInsert": {
            "pair_key": &thread.pair_key,
            "participants": thread.participants.clone(),
            "trip_request_id": *trip_request_id,
            "metadata": {
                "is_deleted": false,
                "created_at": DateTime::now(),
                "updated_at": DateTime::now(),
            },
        }};

        let upsert = self
            .bounded(async {
                self.threads
                    .inner()
                    .update_one(filter.clone(), update)
                    .upsert(true)
                    .await
            })
            .await;

        match upsert {
            Ok(_) => {}
            // A racing upsert can still trip the unique index; the other
            // writer's thread is the one to converge on.
            Err(StoreError::Duplicate) => {}
            Err(e) => return Err(e),
        }

        let existing = self.bounded(self.threads.find_one(filter)).await?;
        existing
            .and_then(|t| t._id)
            .ok_or_else(|| StoreError::Backend("thread upsert yielded no document".to_string()))
    }

    async fn thread_for_pair(
        &self,
        owner: &str,
        requester: &str,
    ) -> Result<Option<ThreadDoc>, StoreError> {
        let key = crate::db::schemas::thread_pair_key(owner, requester);
        self.bounded(self.threads.find_one(doc! { "pair_key": key }))
            .await
    }
}
