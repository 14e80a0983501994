//! Event membership and access-request engine
//!
//! Direct membership (join, leave) for public open events, and the
//! access-request flow for private events. Capacity and duplicate-join
//! races are closed by the store's guarded join primitive; this layer
//! only decides admission, throttling, and who may respond.

use bson::oid::ObjectId;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use crate::auth::Principal;
use crate::config::JoinPolicy;
use crate::db::schemas::{AccessRequestDoc, AccessRequestStatus, EventDoc};
use crate::engine::authz;
use crate::engine::denial::Denial;
use crate::engine::{EngineError, EngineResult};
use crate::notify::Notifier;
use crate::store::{JoinOutcome, RelationshipStore, StoreError};

/// Outcome of a membership action, reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOutcome {
    Joined { event_id: ObjectId },
    Waitlisted { event_id: ObjectId },
    Left { event_id: ObjectId },
}

impl MembershipOutcome {
    pub fn state(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::Waitlisted { .. } => "waitlisted",
            Self::Left { .. } => "left",
        }
    }
}

/// Event membership and access-request engine
pub struct EventEngine {
    store: Arc<dyn RelationshipStore>,
    notifier: Arc<Notifier>,
    join_policy: JoinPolicy,
}

impl EventEngine {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        notifier: Arc<Notifier>,
        join_policy: JoinPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            join_policy,
        }
    }

    /// Direct join. Public open events only; private events redirect to
    /// the access-request flow. The seat reservation and the
    /// one-membership-per-principal rule are enforced store-side.
    pub async fn join(
        &self,
        principal: &Principal,
        event_id: &ObjectId,
    ) -> EngineResult<MembershipOutcome> {
        let event = self.load_event(event_id).await?;
        authz::check_event_admission(&event)?;
        self.check_throttle(principal).await?;

        match self.store.join_event(event_id, &principal.id).await? {
            JoinOutcome::Joined => {
                info!(event_id = %event_id, principal = %principal.id, "Joined event");
                self.notifier
                    .transition("event_joined", &event.host, event_id.to_hex())
                    .await;
                Ok(MembershipOutcome::Joined { event_id: *event_id })
            }
            JoinOutcome::Waitlisted => {
                info!(event_id = %event_id, principal = %principal.id, "Waitlisted for event");
                self.notifier
                    .transition("event_waitlisted", &event.host, event_id.to_hex())
                    .await;
                Ok(MembershipOutcome::Waitlisted { event_id: *event_id })
            }
            JoinOutcome::AlreadyPresent => Err(Denial::AlreadyJoinedOrWaitlisted.into()),
        }
    }

    /// Leave an event. The host may never leave their own event; a held
    /// seat is released store-side.
    pub async fn leave(
        &self,
        principal: &Principal,
        event_id: &ObjectId,
    ) -> EngineResult<MembershipOutcome> {
        let event = self.load_event(event_id).await?;
        if event.host == principal.id {
            return Err(Denial::HostCannotLeaveOwnEvent.into());
        }

        if !self.store.leave_event(event_id, &principal.id).await? {
            return Err(Denial::MembershipNotFound.into());
        }

        info!(event_id = %event_id, principal = %principal.id, "Left event");
        self.notifier
            .transition("event_left", &event.host, event_id.to_hex())
            .await;
        Ok(MembershipOutcome::Left { event_id: *event_id })
    }

    /// Ask for admission to a private event. On a public event this is a
    /// denial (join directly instead). A second request while one is
    /// pending returns the existing request rather than a duplicate.
    pub async fn request(
        &self,
        principal: &Principal,
        event_id: &ObjectId,
        note: Option<String>,
    ) -> EngineResult<AccessRequestDoc> {
        let event = self.load_event(event_id).await?;
        match authz::check_event_admission(&event) {
            Err(Denial::PrivateEventRequiresRequest) => {}
            Err(other) => return Err(other.into()),
            Ok(()) => return Err(Denial::EventIsPublic.into()),
        }

        if self.store.membership(event_id, &principal.id).await?.is_some() {
            return Err(Denial::AlreadyJoinedOrWaitlisted.into());
        }

        if let Some(existing) = self
            .store
            .pending_access_request(event_id, &principal.id)
            .await?
        {
            return Ok(existing);
        }

        let doc = AccessRequestDoc::new(*event_id, principal.id.clone(), note);
        let id = match self.store.insert_access_request(doc).await {
            Ok(id) => id,
            // A racing request landed first; converge on the one that won
            Err(StoreError::Duplicate) => {
                return self
                    .store
                    .pending_access_request(event_id, &principal.id)
                    .await?
                    .ok_or_else(|| EngineError::Store(StoreError::NotFound));
            }
            Err(e) => return Err(e.into()),
        };

        info!(event_id = %event_id, requester = %principal.id, request_id = %id, "Event access requested");
        self.notifier
            .transition("event_request_received", &event.host, id.to_hex())
            .await;

        self.store
            .access_request(&id)
            .await?
            .ok_or_else(|| EngineError::Store(StoreError::NotFound))
    }

    /// Withdraw one's own pending request
    pub async fn cancel_request(
        &self,
        principal: &Principal,
        event_id: &ObjectId,
    ) -> EngineResult<()> {
        let event = self.load_event(event_id).await?;

        let request = self
            .store
            .pending_access_request(event_id, &principal.id)
            .await?
            .ok_or(Denial::RequestNotFoundOrNotPending)?;
        let request_id = request
            ._id
            .ok_or_else(|| EngineError::Store(StoreError::Backend("request without id".into())))?;

        if !self.store.withdraw_access_request(&request_id).await? {
            return Err(Denial::RequestNotFoundOrNotPending.into());
        }

        info!(event_id = %event_id, requester = %principal.id, "Event access request cancelled");
        self.notifier
            .transition("event_request_cancelled", &event.host, request_id.to_hex())
            .await;
        Ok(())
    }

    /// Host responds to a pending request. Acceptance converts the
    /// request into a membership through the guarded join, so capacity
    /// still applies; a full event waitlists the accepted requester.
    pub async fn respond_request(
        &self,
        principal: &Principal,
        request_id: &ObjectId,
        accept: bool,
    ) -> EngineResult<AccessRequestDoc> {
        let request = self
            .store
            .access_request(request_id)
            .await?
            .ok_or(Denial::RequestNotFound)?;
        let event = self.load_event(&request.event_id).await?;
        authz::check_event_host(&event, principal)?;

        if request.status != AccessRequestStatus::Pending {
            return Err(Denial::RequestNotPending.into());
        }

        let next = if accept {
            AccessRequestStatus::Accepted
        } else {
            AccessRequestStatus::Declined
        };

        if accept {
            // Membership before the status flip: a failed join leaves the
            // request pending, and a retried accept converges through
            // AlreadyPresent. Seat accounting still applies to
            // host-admitted members.
            match self
                .store
                .join_event(&request.event_id, &request.requester)
                .await?
            {
                JoinOutcome::Joined | JoinOutcome::AlreadyPresent => {}
                JoinOutcome::Waitlisted => {
                    info!(
                        event_id = %request.event_id,
                        requester = %request.requester,
                        "Accepted requester waitlisted at capacity"
                    );
                }
            }
        }

        let applied = self
            .store
            .update_access_request_status_if(request_id, AccessRequestStatus::Pending, next)
            .await?;
        if !applied {
            return Err(Denial::RequestNotPending.into());
        }

        let kind = if accept {
            "event_request_accepted"
        } else {
            "event_request_declined"
        };
        info!(request_id = %request_id, status = next.as_str(), host = %principal.id, "Access request resolved");
        self.notifier
            .transition(kind, &request.requester, request_id.to_hex())
            .await;

        self.store
            .access_request(request_id)
            .await?
            .ok_or_else(|| EngineError::Store(StoreError::NotFound))
    }

    /// Host responds addressing the request by (event, requester) rather
    /// than by request id. Resolves to the pending request and runs the
    /// same transition.
    pub async fn respond_request_for(
        &self,
        principal: &Principal,
        event_id: &ObjectId,
        requester: &str,
        accept: bool,
    ) -> EngineResult<AccessRequestDoc> {
        let request = self
            .store
            .pending_access_request(event_id, requester)
            .await?
            .ok_or(Denial::RequestNotFoundOrNotPending)?;
        let request_id = request
            ._id
            .ok_or_else(|| EngineError::Store(StoreError::Backend("request without id".into())))?;
        self.respond_request(principal, &request_id, accept).await
    }

    async fn load_event(&self, event_id: &ObjectId) -> EngineResult<EventDoc> {
        Ok(self
            .store
            .event(event_id)
            .await?
            .ok_or(Denial::EventNotFound)?)
    }

    /// Verified-email and new-account limits. The recent-join count read
    /// is skipped for accounts old enough to be exempt.
    async fn check_throttle(&self, principal: &Principal) -> EngineResult<()> {
        if self.join_policy.require_verified_email && !principal.email_verified {
            return Err(Denial::EmailVerificationRequiredForJoin.into());
        }

        if !authz::join_throttle_applies(&self.join_policy, principal) {
            return Ok(());
        }

        let window_start =
            Utc::now() - Duration::hours(self.join_policy.join_window_hours);
        let recent = self
            .store
            .count_recent_joins(&principal.id, bson::DateTime::from_chrono(window_start))
            .await?;

        authz::check_join_throttle(&self.join_policy, principal, recent)?;
        Ok(())
    }
}
