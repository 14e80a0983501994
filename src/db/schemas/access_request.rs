//! Event access request document schema
//!
//! A pending ask for admission to a private event. Only created for
//! private events; once non-pending, immutable except by a fresh request.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for event access requests
pub const ACCESS_REQUEST_COLLECTION: &str = "event_access_requests";

/// Access request lifecycle status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

impl AccessRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

/// Access request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AccessRequestDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Event being requested
    pub event_id: ObjectId,

    /// Requesting principal
    pub requester: String,

    /// Optional note to the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: AccessRequestStatus,
}

impl AccessRequestDoc {
    pub fn new(event_id: ObjectId, requester: String, note: Option<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            event_id,
            requester,
            note,
            status: AccessRequestStatus::Pending,
        }
    }
}

impl IntoIndexes for AccessRequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // At most one pending request per (event, requester); the
            // create path relies on this to close the double-request race.
            (
                doc! { "event_id": 1, "requester": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "status": "pending" })
                        .name("access_request_pending_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "event_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("access_request_event_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AccessRequestDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
