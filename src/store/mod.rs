//! Relationship store adapter
//!
//! A narrow, typed interface over the durable store. Per entity it
//! exposes reads, inserts, and conditional status updates; where the
//! store can close a race window it exposes a guarded primitive instead
//! (event join/leave, thread creation) so no caller ever does a manual
//! check-then-write against those records.
//!
//! Two implementations: MongoDB for production and an in-memory store
//! for dev mode and the engine test suite.

pub mod memory;
pub mod mongo;

pub use memory::MemoryRelationshipStore;
pub use mongo::MongoRelationshipStore;

use async_trait::async_trait;
use bson::oid::ObjectId;

use crate::db::schemas::{
    AccessRequestDoc, AccessRequestStatus, ConnectionDoc, EventDoc, LegacyCompletionDoc,
    MembershipDoc, SyncDoc, SyncStatus, ThreadDoc, TripRequestDoc, TripRequestStatus,
};

/// Typed store failure. Constraint violations surface as distinct
/// variants rather than being flattened into strings, because the
/// engines recover from some of them (legacy mirror) and classify the
/// rest for the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate record")]
    Duplicate,

    #[error("target collection missing")]
    MissingSchema,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result of the guarded event-join primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A seat was held and the membership created
    Joined,
    /// Event at capacity; membership created in waitlisted state
    Waitlisted,
    /// A membership (joined or waitlisted) already existed
    AlreadyPresent,
}

/// Fields a sync status transition may set alongside the new status
#[derive(Debug, Clone, Default)]
pub struct SyncWrite {
    pub completed_at: Option<bson::DateTime>,
    pub note: Option<String>,
}

/// Typed access to the relationship records.
///
/// Conditional updates (`*_status_if`) are compare-and-swap style: the
/// write applies only if the record still holds the expected status, and
/// the return value says whether it did. A `false` return means the
/// caller lost a race or the precondition never held; it must be
/// reported as a state conflict, never retried into a blind write.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    // Connections

    async fn insert_connection(&self, doc: ConnectionDoc) -> Result<ObjectId, StoreError>;

    async fn connection(&self, id: &ObjectId) -> Result<Option<ConnectionDoc>, StoreError>;

    // Syncs

    async fn insert_sync(&self, doc: SyncDoc) -> Result<ObjectId, StoreError>;

    async fn sync(&self, id: &ObjectId) -> Result<Option<SyncDoc>, StoreError>;

    async fn update_sync_status_if(
        &self,
        id: &ObjectId,
        expected: SyncStatus,
        next: SyncStatus,
        write: SyncWrite,
    ) -> Result<bool, StoreError>;

    /// Best-effort mirror write for completed syncs. Callers decide which
    /// failures to absorb; this method classifies, never swallows.
    async fn insert_legacy_completion(&self, doc: LegacyCompletionDoc) -> Result<(), StoreError>;

    // Events and memberships

    async fn insert_event(&self, doc: EventDoc) -> Result<ObjectId, StoreError>;

    async fn event(&self, id: &ObjectId) -> Result<Option<EventDoc>, StoreError>;

    /// Guarded join: atomically reserves a seat (or waitlists) and
    /// creates the membership. The duplicate-join and capacity races are
    /// closed store-side.
    async fn join_event(&self, event_id: &ObjectId, principal: &str)
        -> Result<JoinOutcome, StoreError>;

    /// Guarded leave: removes the membership and releases a held seat.
    /// Returns false when no membership existed.
    async fn leave_event(&self, event_id: &ObjectId, principal: &str) -> Result<bool, StoreError>;

    async fn membership(
        &self,
        event_id: &ObjectId,
        principal: &str,
    ) -> Result<Option<MembershipDoc>, StoreError>;

    /// Number of memberships this principal created since the given time
    /// (join throttling input)
    async fn count_recent_joins(
        &self,
        principal: &str,
        since: bson::DateTime,
    ) -> Result<u64, StoreError>;

    // Event access requests

    async fn insert_access_request(&self, doc: AccessRequestDoc) -> Result<ObjectId, StoreError>;

    async fn access_request(&self, id: &ObjectId) -> Result<Option<AccessRequestDoc>, StoreError>;

    /// The pending request for (event, requester), if any
    async fn pending_access_request(
        &self,
        event_id: &ObjectId,
        requester: &str,
    ) -> Result<Option<AccessRequestDoc>, StoreError>;

    async fn update_access_request_status_if(
        &self,
        id: &ObjectId,
        expected: AccessRequestStatus,
        next: AccessRequestStatus,
    ) -> Result<bool, StoreError>;

    /// Withdraw a pending request (soft delete). Returns false when the
    /// request was not pending anymore.
    async fn withdraw_access_request(&self, id: &ObjectId) -> Result<bool, StoreError>;

    // Trip requests and threads

    async fn insert_trip_request(&self, doc: TripRequestDoc) -> Result<ObjectId, StoreError>;

    async fn trip_request(&self, id: &ObjectId) -> Result<Option<TripRequestDoc>, StoreError>;

    async fn update_trip_status_if(
        &self,
        id: &ObjectId,
        expected: TripRequestStatus,
        next: TripRequestStatus,
    ) -> Result<bool, StoreError>;

    /// Convergent thread creation for a participant pair: racing calls
    /// observe exactly one thread.
    async fn ensure_thread(
        &self,
        owner: &str,
        requester: &str,
        trip_request_id: &ObjectId,
    ) -> Result<ObjectId, StoreError>;

    async fn thread_for_pair(
        &self,
        owner: &str,
        requester: &str,
    ) -> Result<Option<ThreadDoc>, StoreError>;
}
