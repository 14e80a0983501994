//! Trip request engine
//!
//! A request to join another principal's trip: `pending -> {accepted,
//! declined, cancelled}`, all terminal. Acceptance opens a thread scoped
//! to the two participants; the store's convergent thread primitive
//! guarantees racing accepts observe a single thread. Declines never
//! create a thread.

use bson::oid::ObjectId;
use std::sync::Arc;
use tracing::info;

use crate::auth::Principal;
use crate::db::schemas::{TripRequestDoc, TripRequestStatus};
use crate::engine::authz;
use crate::engine::denial::Denial;
use crate::engine::guard::{RoleRule, Transition};
use crate::engine::{EngineError, EngineResult};
use crate::notify::Notifier;
use crate::store::{RelationshipStore, StoreError};

/// Only the trip owner may accept
const ACCEPT: Transition<TripRequestStatus> = Transition {
    from: &[TripRequestStatus::Pending],
    to: TripRequestStatus::Accepted,
    role: RoleRule::CounterpartyOnly,
    wrong_state: Denial::TripRequestNotPending,
};

/// Only the trip owner may decline
const DECLINE: Transition<TripRequestStatus> = Transition {
    from: &[TripRequestStatus::Pending],
    to: TripRequestStatus::Declined,
    role: RoleRule::CounterpartyOnly,
    wrong_state: Denial::TripRequestNotPending,
};

/// Only the requester may cancel
const CANCEL: Transition<TripRequestStatus> = Transition {
    from: &[TripRequestStatus::Pending],
    to: TripRequestStatus::Cancelled,
    role: RoleRule::InitiatorOnly,
    wrong_state: Denial::TripRequestNotPending,
};

/// Result of an accepted trip request: the updated request plus the
/// thread it opened (new or pre-existing).
#[derive(Debug, Clone)]
pub struct TripAcceptance {
    pub request: TripRequestDoc,
    pub thread_id: ObjectId,
}

/// Trip request engine
pub struct TripEngine {
    store: Arc<dyn RelationshipStore>,
    notifier: Arc<Notifier>,
}

impl TripEngine {
    pub fn new(store: Arc<dyn RelationshipStore>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create a request against another principal's trip. Requesting
    /// one's own trip is rejected outright.
    pub async fn create(
        &self,
        principal: &Principal,
        owner: &str,
        trip: &str,
        note: Option<String>,
    ) -> EngineResult<TripRequestDoc> {
        if owner == principal.id {
            return Err(Denial::InvalidAction.into());
        }

        let doc = TripRequestDoc::new(
            owner.to_string(),
            principal.id.clone(),
            trip.to_string(),
            note,
        );
        let id = self.store.insert_trip_request(doc).await?;

        info!(trip_request_id = %id, requester = %principal.id, owner = %owner, "Trip request created");
        self.notifier
            .transition("trip_request_received", owner, id.to_hex())
            .await;

        self.store
            .trip_request(&id)
            .await?
            .ok_or_else(|| EngineError::Store(StoreError::NotFound))
    }

    /// Owner accepts a pending request and a thread is opened for the
    /// pair. Thread creation is convergent, so a duplicate accept race
    /// or a prior thread between the same pair yields the same thread.
    pub async fn accept(
        &self,
        principal: &Principal,
        request_id: &ObjectId,
    ) -> EngineResult<TripAcceptance> {
        let request = self
            .apply(principal, request_id, ACCEPT, "trip_request_accepted")
            .await?;

        let thread_id = self
            .store
            .ensure_thread(&request.owner, &request.requester, request_id)
            .await?;

        info!(trip_request_id = %request_id, thread_id = %thread_id, "Trip thread ready");
        Ok(TripAcceptance { request, thread_id })
    }

    /// Owner declines a pending request. No thread is created.
    pub async fn decline(
        &self,
        principal: &Principal,
        request_id: &ObjectId,
    ) -> EngineResult<TripRequestDoc> {
        self.apply(principal, request_id, DECLINE, "trip_request_declined")
            .await
    }

    /// Requester withdraws their own pending request
    pub async fn cancel(
        &self,
        principal: &Principal,
        request_id: &ObjectId,
    ) -> EngineResult<TripRequestDoc> {
        self.apply(principal, request_id, CANCEL, "trip_request_cancelled")
            .await
    }

    async fn apply(
        &self,
        principal: &Principal,
        request_id: &ObjectId,
        transition: Transition<TripRequestStatus>,
        kind: &'static str,
    ) -> EngineResult<TripRequestDoc> {
        let request = self
            .store
            .trip_request(request_id)
            .await?
            .ok_or(Denial::TripRequestNotFound)?;

        let party = authz::trip_party(&request, principal)?;
        transition.authorize(request.status, party)?;

        let applied = self
            .store
            .update_trip_status_if(request_id, request.status, transition.to)
            .await?;
        if !applied {
            return Err(transition.wrong_state.into());
        }

        let updated = self
            .store
            .trip_request(request_id)
            .await?
            .ok_or_else(|| EngineError::Store(StoreError::NotFound))?;

        let other = if principal.id == updated.requester {
            &updated.owner
        } else {
            &updated.requester
        };
        info!(trip_request_id = %request_id, status = transition.to.as_str(), actor = %principal.id, "Trip request transition");
        self.notifier.transition(kind, other, request_id.to_hex()).await;

        Ok(updated)
    }
}
