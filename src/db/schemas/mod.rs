//! Database schemas for Cabeceo
//!
//! Document structures for the relationship records: connections, syncs,
//! events, memberships, access requests, trip requests, and threads.

mod access_request;
mod connection;
mod event;
mod metadata;
mod sync;
mod trip;

pub use access_request::{AccessRequestDoc, AccessRequestStatus, ACCESS_REQUEST_COLLECTION};
pub use connection::{ConnectionDoc, ConnectionStatus, CONNECTION_COLLECTION};
pub use event::{
    EventAdmission, EventDoc, EventVisibility, MembershipDoc, MembershipState, EVENT_COLLECTION,
    MEMBERSHIP_COLLECTION,
};
pub use metadata::Metadata;
pub use sync::{
    LegacyCompletionDoc, SyncDoc, SyncStatus, SyncType, LEGACY_COMPLETION_COLLECTION,
    SYNC_COLLECTION,
};
pub use trip::{
    thread_pair_key, ThreadDoc, TripRequestDoc, TripRequestStatus, THREAD_COLLECTION,
    TRIP_REQUEST_COLLECTION,
};
