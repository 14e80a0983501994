//! Connection document schema
//!
//! A bidirectional relationship between two principals. Only an accepted
//! connection may originate a sync; no third party may mutate it.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for connections
pub const CONNECTION_COLLECTION: &str = "connections";

/// Connection lifecycle status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Blocked,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Blocked => "blocked",
        }
    }
}

/// Connection document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ConnectionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Principal who initiated the connection
    pub requester: String,

    /// Principal on the other side
    pub target: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: ConnectionStatus,
}

impl ConnectionDoc {
    pub fn new(requester: String, target: String, status: ConnectionStatus) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            requester,
            target,
            status,
        }
    }

    /// Whether the given principal is one of the two participants
    pub fn is_participant(&self, principal: &str) -> bool {
        self.requester == principal || self.target == principal
    }

    /// The participant who is not the given principal, if the principal
    /// is a participant at all
    pub fn other_participant(&self, principal: &str) -> Option<&str> {
        if self.requester == principal {
            Some(&self.target)
        } else if self.target == principal {
            Some(&self.requester)
        } else {
            None
        }
    }
}

impl IntoIndexes for ConnectionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "requester": 1, "target": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("connection_pair_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "target": 1 },
                Some(
                    IndexOptions::builder()
                        .name("connection_target_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ConnectionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_participant() {
        let doc = ConnectionDoc::new("a".into(), "b".into(), ConnectionStatus::Accepted);
        assert_eq!(doc.other_participant("a"), Some("b"));
        assert_eq!(doc.other_participant("b"), Some("a"));
        assert_eq!(doc.other_participant("c"), None);
    }
}
