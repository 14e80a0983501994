//! Trip request and thread document schemas
//!
//! A trip request asks to join another principal's trip. Acceptance
//! opens a thread scoped to exactly {owner, requester}; the thread's
//! unique pair key makes creation convergent under racing accepts.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for trip requests
pub const TRIP_REQUEST_COLLECTION: &str = "trip_requests";

/// Collection name for threads
pub const THREAD_COLLECTION: &str = "threads";

/// Trip request lifecycle status: `pending -> {accepted, declined,
/// cancelled}`, all terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripRequestStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl TripRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Trip request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TripRequestDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Principal whose trip is being requested
    pub owner: String,

    /// Requesting principal
    pub requester: String,

    /// External trip/plan reference
    pub trip: String,

    /// Optional note to the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: TripRequestStatus,
}

impl TripRequestDoc {
    pub fn new(owner: String, requester: String, trip: String, note: Option<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            owner,
            requester,
            trip,
            note,
            status: TripRequestStatus::Pending,
        }
    }
}

impl IntoIndexes for TripRequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "owner": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("trip_request_owner_status_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "requester": 1 },
                Some(
                    IndexOptions::builder()
                        .name("trip_request_requester_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TripRequestDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Canonical pair key for a two-participant thread.
///
/// Ordered so that both sides of a pair derive the same key; the unique
/// index on it is what makes thread creation convergent.
pub fn thread_pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

/// Thread document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ThreadDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Canonical ordered participant pair key (unique)
    pub pair_key: String,

    /// Exactly the two participants
    pub participants: Vec<String>,

    /// Trip request that opened this thread
    pub trip_request_id: ObjectId,
}

impl ThreadDoc {
    pub fn new(owner: &str, requester: &str, trip_request_id: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            pair_key: thread_pair_key(owner, requester),
            participants: vec![owner.to_string(), requester.to_string()],
            trip_request_id,
        }
    }
}

impl IntoIndexes for ThreadDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "pair_key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("thread_pair_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ThreadDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        assert_eq!(thread_pair_key("ana", "berto"), thread_pair_key("berto", "ana"));
        assert_eq!(thread_pair_key("ana", "berto"), "ana:berto");
    }
}
