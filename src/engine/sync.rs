//! Connection-sync lifecycle engine
//!
//! `pending -> {accepted, declined, cancelled}`; `accepted -> completed`.
//! All four targets are terminal. Transitions are applied with a
//! conditional write keyed on the previously observed status, so a race
//! loser gets a state conflict instead of clobbering the winner.

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Principal;
use crate::db::schemas::{LegacyCompletionDoc, SyncDoc, SyncStatus, SyncType};
use crate::engine::authz;
use crate::engine::denial::Denial;
use crate::engine::guard::{Party, RoleRule, Transition};
use crate::engine::{EngineError, EngineResult};
use crate::notify::Notifier;
use crate::store::{RelationshipStore, StoreError, SyncWrite};

/// Only the recipient may accept
const ACCEPT: Transition<SyncStatus> = Transition {
    from: &[SyncStatus::Pending],
    to: SyncStatus::Accepted,
    role: RoleRule::CounterpartyOnly,
    wrong_state: Denial::SyncNotPending,
};

/// Only the recipient may decline
const DECLINE: Transition<SyncStatus> = Transition {
    from: &[SyncStatus::Pending],
    to: SyncStatus::Declined,
    role: RoleRule::CounterpartyOnly,
    wrong_state: Denial::SyncNotPending,
};

/// Either participant may cancel while pending
const CANCEL: Transition<SyncStatus> = Transition {
    from: &[SyncStatus::Pending],
    to: SyncStatus::Cancelled,
    role: RoleRule::Either,
    wrong_state: Denial::SyncNotPending,
};

/// Either participant may complete an accepted sync
const COMPLETE: Transition<SyncStatus> = Transition {
    from: &[SyncStatus::Accepted],
    to: SyncStatus::Completed,
    role: RoleRule::Either,
    wrong_state: Denial::SyncNotAccepted,
};

/// Connection-sync lifecycle engine
pub struct SyncEngine {
    store: Arc<dyn RelationshipStore>,
    notifier: Arc<Notifier>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RelationshipStore>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Propose a sync on an accepted connection. The recipient is
    /// derived as the other connection participant, never taken from
    /// the caller.
    pub async fn propose(
        &self,
        principal: &Principal,
        connection_id: &ObjectId,
        sync_type: SyncType,
        scheduled_at: Option<DateTime>,
        note: Option<String>,
    ) -> EngineResult<SyncDoc> {
        let connection = self
            .store
            .connection(connection_id)
            .await?
            .ok_or(Denial::ConnectionNotFound)?;

        authz::check_sync_proposal(&connection, principal)?;

        let recipient = connection
            .other_participant(&principal.id)
            .ok_or(Denial::NotAuthorized)?
            .to_string();

        let doc = SyncDoc::new(
            *connection_id,
            principal.id.clone(),
            recipient.clone(),
            sync_type,
            scheduled_at,
            note,
        );
        let id = self.store.insert_sync(doc).await?;

        info!(sync_id = %id, requester = %principal.id, recipient = %recipient, "Sync proposed");
        self.notifier
            .transition("sync_proposed", &recipient, id.to_hex())
            .await;

        self.store
            .sync(&id)
            .await?
            .ok_or_else(|| EngineError::Store(StoreError::NotFound))
    }

    /// Recipient accepts or declines a pending sync
    pub async fn respond(
        &self,
        principal: &Principal,
        sync_id: &ObjectId,
        accept: bool,
    ) -> EngineResult<SyncDoc> {
        let transition = if accept { ACCEPT } else { DECLINE };
        let kind = if accept { "sync_accepted" } else { "sync_declined" };
        self.apply(principal, sync_id, transition, kind, SyncWrite::default())
            .await
    }

    /// Either participant cancels a pending sync
    pub async fn cancel(&self, principal: &Principal, sync_id: &ObjectId) -> EngineResult<SyncDoc> {
        self.apply(principal, sync_id, CANCEL, "sync_cancelled", SyncWrite::default())
            .await
    }

    /// Either participant completes an accepted sync. Stamps the
    /// completion time and mirrors the completion into the legacy
    /// collection best-effort.
    pub async fn complete(
        &self,
        principal: &Principal,
        sync_id: &ObjectId,
        note: Option<String>,
    ) -> EngineResult<SyncDoc> {
        let write = SyncWrite {
            completed_at: Some(DateTime::now()),
            note,
        };
        let sync = self
            .apply(principal, sync_id, COMPLETE, "sync_completed", write)
            .await?;

        self.mirror_completion(principal, &sync).await?;
        Ok(sync)
    }

    /// Shared transition sequence: load, classify party, authorize role
    /// and state, apply the conditional write, re-check on a lost race,
    /// notify the other participant.
    async fn apply(
        &self,
        principal: &Principal,
        sync_id: &ObjectId,
        transition: Transition<SyncStatus>,
        kind: &'static str,
        write: SyncWrite,
    ) -> EngineResult<SyncDoc> {
        let sync = self.store.sync(sync_id).await?.ok_or(Denial::SyncNotFound)?;

        let party = authz::sync_party(&sync, principal)?;
        transition.authorize(sync.status, party)?;

        let applied = self
            .store
            .update_sync_status_if(sync_id, sync.status, transition.to, write)
            .await?;
        if !applied {
            // Lost the race between read and write; the final status
            // recheck at write time rejects us.
            return Err(transition.wrong_state.into());
        }

        let updated = self
            .store
            .sync(sync_id)
            .await?
            .ok_or_else(|| EngineError::Store(StoreError::NotFound))?;

        let other = if party == Party::Initiator {
            &updated.recipient
        } else {
            &updated.requester
        };
        info!(sync_id = %sync_id, status = transition.to.as_str(), actor = %principal.id, "Sync transition");
        self.notifier.transition(kind, other, sync_id.to_hex()).await;

        Ok(updated)
    }

    /// Best-effort legacy mirror write. A missing mirror collection or a
    /// duplicate completion is absorbed and logged; anything else
    /// surfaces to the caller.
    async fn mirror_completion(&self, principal: &Principal, sync: &SyncDoc) -> EngineResult<()> {
        let sync_id = match sync._id {
            Some(id) => id,
            None => return Ok(()),
        };

        let mirror = LegacyCompletionDoc {
            _id: None,
            metadata: Default::default(),
            connection_id: sync.connection_id,
            sync_id,
            completed_by: principal.id.clone(),
            note: sync.note.clone(),
        };

        match self.store.insert_legacy_completion(mirror).await {
            Ok(()) => Ok(()),
            Err(StoreError::MissingSchema) => {
                warn!(sync_id = %sync_id, "Legacy completion mirror absent; skipping");
                Ok(())
            }
            Err(StoreError::Duplicate) => {
                warn!(sync_id = %sync_id, "Legacy completion already mirrored; skipping");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
