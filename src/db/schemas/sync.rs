//! Sync document schema
//!
//! A proposed shared activity tied to exactly one connection. The
//! recipient is always the connection participant who is not the
//! proposer; it is derived server-side, never client-supplied.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for syncs
pub const SYNC_COLLECTION: &str = "syncs";

/// Collection name for the legacy completion mirror
pub const LEGACY_COMPLETION_COLLECTION: &str = "sync_completions_legacy";

/// Kind of shared activity
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    #[default]
    Training,
    SocialDancing,
    Workshop,
}

/// Sync lifecycle status
///
/// `pending -> {accepted, declined, cancelled}`; `accepted -> completed`.
/// Declined, cancelled, and completed are terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Cancelled,
    Completed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

/// Sync document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SyncDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Connection this sync belongs to
    pub connection_id: ObjectId,

    /// Participant who proposed the sync
    pub requester: String,

    /// The other connection participant (derived, never client-supplied)
    pub recipient: String,

    /// Kind of activity
    #[serde(default)]
    pub sync_type: SyncType,

    /// Optional scheduled time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime>,

    /// Optional free-text note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: SyncStatus,

    /// Completion timestamp, set by the complete transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

impl SyncDoc {
    pub fn new(
        connection_id: ObjectId,
        requester: String,
        recipient: String,
        sync_type: SyncType,
        scheduled_at: Option<DateTime>,
        note: Option<String>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            connection_id,
            requester,
            recipient,
            sync_type,
            scheduled_at,
            note,
            status: SyncStatus::Pending,
            completed_at: None,
        }
    }
}

impl IntoIndexes for SyncDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "connection_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("sync_connection_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "recipient": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("sync_recipient_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SyncDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Legacy completion mirror record, keyed by connection.
///
/// Written best-effort when a sync completes; the primary record is the
/// SyncDoc itself. A missing mirror collection or a duplicate completion
/// is not an error for the completing caller.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LegacyCompletionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Connection the completed sync belonged to
    pub connection_id: ObjectId,

    /// Sync that completed
    pub sync_id: ObjectId,

    /// Who reported the completion
    pub completed_by: String,

    /// Optional completion note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IntoIndexes for LegacyCompletionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "connection_id": 1, "sync_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("legacy_completion_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for LegacyCompletionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
