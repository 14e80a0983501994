//! Event and membership document schemas
//!
//! Events are owned by an external collaborator; this core only acts on
//! membership relations against them. The attendee count is maintained
//! exclusively by the guarded join/leave primitives.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for events
pub const EVENT_COLLECTION: &str = "events";

/// Collection name for event memberships
pub const MEMBERSHIP_COLLECTION: &str = "event_memberships";

/// Event visibility
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventVisibility {
    #[default]
    Public,
    Private,
}

/// Event admission state
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventAdmission {
    #[default]
    Open,
    Closed,
    Hidden,
}

/// Event document, consumed as given (not created by this core outside
/// of dev seeding and tests)
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct EventDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Hosting principal; a host may never leave their own event
    pub host: String,

    /// Display title
    pub title: String,

    /// Visibility: private events require an access request
    #[serde(default)]
    pub visibility: EventVisibility,

    /// Admission state
    #[serde(default)]
    pub admission: EventAdmission,

    /// Seat capacity; joins beyond it are waitlisted. None means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,

    /// Seats currently held, maintained by the guarded join/leave primitives
    #[serde(default)]
    pub attendee_count: i64,
}

impl EventDoc {
    pub fn new(host: String, title: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            host,
            title,
            visibility: EventVisibility::Public,
            admission: EventAdmission::Open,
            capacity: None,
            attendee_count: 0,
        }
    }

    pub fn with_visibility(mut self, visibility: EventVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_admission(mut self, admission: EventAdmission) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

impl IntoIndexes for EventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "host": 1 },
            Some(
                IndexOptions::builder()
                    .name("event_host_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for EventDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// A principal's relation to an event
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    #[default]
    Joined,
    Waitlisted,
}

/// Membership document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MembershipDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Event this membership belongs to
    pub event_id: ObjectId,

    /// Member principal
    pub principal: String,

    /// Joined or waitlisted
    #[serde(default)]
    pub state: MembershipState,
}

impl MembershipDoc {
    pub fn new(event_id: ObjectId, principal: String, state: MembershipState) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            event_id,
            principal,
            state,
        }
    }
}

impl IntoIndexes for MembershipDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One membership per (event, principal); the guarded join
            // primitive relies on this to close the duplicate-join race.
            (
                doc! { "event_id": 1, "principal": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("membership_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "principal": 1 },
                Some(
                    IndexOptions::builder()
                        .name("membership_principal_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for MembershipDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
