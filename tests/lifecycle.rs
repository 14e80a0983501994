//! End-to-end lifecycle properties exercised through the engines
//! against the in-memory store.

use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::{Duration, Utc};

use cabeceo::auth::Principal;
use cabeceo::config::JoinPolicy;
use cabeceo::db::schemas::{
    AccessRequestDoc, AccessRequestStatus, ConnectionDoc, ConnectionStatus, EventDoc,
    EventVisibility, SyncStatus, SyncType, TripRequestStatus,
};
use cabeceo::engine::event::MembershipOutcome;
use cabeceo::engine::{Denial, EngineError, EventEngine, SyncEngine, TripEngine};
use cabeceo::notify::Notifier;
use cabeceo::store::{MemoryRelationshipStore, RelationshipStore, StoreError};

fn principal(id: &str) -> Principal {
    Principal {
        id: id.into(),
        identifier: format!("{}@example.com", id),
        email_verified: true,
        created_at: Utc::now() - Duration::days(365),
    }
}

fn policy() -> JoinPolicy {
    JoinPolicy {
        require_verified_email: true,
        new_account_age_days: 7,
        new_account_join_limit: 3,
        join_window_hours: 24,
    }
}

struct Fixture {
    store: Arc<MemoryRelationshipStore>,
    syncs: SyncEngine,
    events: EventEngine,
    trips: TripEngine,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryRelationshipStore::new());
    let notifier = Arc::new(Notifier::disabled());
    let as_store: Arc<dyn RelationshipStore> = store.clone();

    Fixture {
        syncs: SyncEngine::new(Arc::clone(&as_store), Arc::clone(&notifier)),
        events: EventEngine::new(Arc::clone(&as_store), Arc::clone(&notifier), policy()),
        trips: TripEngine::new(as_store, notifier),
        store,
    }
}

async fn accepted_connection(store: &MemoryRelationshipStore, a: &str, b: &str) -> ObjectId {
    store
        .insert_connection(ConnectionDoc::new(
            a.into(),
            b.into(),
            ConnectionStatus::Accepted,
        ))
        .await
        .unwrap()
}

fn denial_of(err: EngineError) -> Denial {
    match err {
        EngineError::Denied(d) => d,
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn completed_sync_is_immutable() {
    let f = fixture();
    let ana = principal("ana");
    let berto = principal("berto");
    let conn = accepted_connection(&f.store, "ana", "berto").await;

    let sync = f
        .syncs
        .propose(&ana, &conn, SyncType::Training, None, None)
        .await
        .unwrap();
    let sync_id = sync._id.unwrap();

    f.syncs.respond(&berto, &sync_id, true).await.unwrap();
    f.syncs.complete(&ana, &sync_id, None).await.unwrap();

    // Terminal state: any further transition is a state conflict
    let err = f.syncs.cancel(&berto, &sync_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::SyncNotPending);

    let stored = f.store.sync(&sync_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Completed);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn sync_recipient_is_derived_from_connection() {
    let f = fixture();
    let ana = principal("ana");
    let conn = accepted_connection(&f.store, "ana", "berto").await;

    let sync = f
        .syncs
        .propose(&ana, &conn, SyncType::SocialDancing, None, None)
        .await
        .unwrap();
    assert_eq!(sync.requester, "ana");
    assert_eq!(sync.recipient, "berto");
}

#[tokio::test]
async fn proposer_cannot_accept_own_sync() {
    let f = fixture();
    let ana = principal("ana");
    let conn = accepted_connection(&f.store, "ana", "berto").await;

    let sync = f
        .syncs
        .propose(&ana, &conn, SyncType::Training, None, None)
        .await
        .unwrap();

    let err = f
        .syncs
        .respond(&ana, &sync._id.unwrap(), true)
        .await
        .unwrap_err();
    assert_eq!(denial_of(err), Denial::NotAuthorized);
}

#[tokio::test]
async fn sync_requires_accepted_connection() {
    let f = fixture();
    let ana = principal("ana");
    let conn = f
        .store
        .insert_connection(ConnectionDoc::new(
            "ana".into(),
            "berto".into(),
            ConnectionStatus::Pending,
        ))
        .await
        .unwrap();

    let err = f
        .syncs
        .propose(&ana, &conn, SyncType::Training, None, None)
        .await
        .unwrap_err();
    assert_eq!(denial_of(err), Denial::ConnectionNotAccepted);
}

#[tokio::test]
async fn outsider_cannot_touch_a_sync() {
    let f = fixture();
    let ana = principal("ana");
    let carla = principal("carla");
    let conn = accepted_connection(&f.store, "ana", "berto").await;

    let sync = f
        .syncs
        .propose(&ana, &conn, SyncType::Workshop, None, None)
        .await
        .unwrap();

    let err = f
        .syncs
        .cancel(&carla, &sync._id.unwrap())
        .await
        .unwrap_err();
    assert_eq!(denial_of(err), Denial::NotAuthorized);
}

#[tokio::test]
async fn double_join_is_rejected() {
    let f = fixture();
    let ana = principal("ana");
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Milonga".into()))
        .await
        .unwrap();

    let outcome = f.events.join(&ana, &event_id).await.unwrap();
    assert_eq!(outcome, MembershipOutcome::Joined { event_id });

    let err = f.events.join(&ana, &event_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::AlreadyJoinedOrWaitlisted);
}

#[tokio::test]
async fn full_event_waitlists() {
    let f = fixture();
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Practica".into()).with_capacity(1))
        .await
        .unwrap();

    let first = f.events.join(&principal("ana"), &event_id).await.unwrap();
    assert_eq!(first, MembershipOutcome::Joined { event_id });

    let second = f.events.join(&principal("berto"), &event_id).await.unwrap();
    assert_eq!(second, MembershipOutcome::Waitlisted { event_id });
}

#[tokio::test]
async fn request_on_public_event_is_rejected() {
    let f = fixture();
    let ana = principal("ana");
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Milonga".into()))
        .await
        .unwrap();

    let err = f.events.request(&ana, &event_id, None).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::EventIsPublic);
}

#[tokio::test]
async fn private_event_request_flow() {
    let f = fixture();
    let ana = principal("ana");
    let host = principal("host");
    let event_id = f
        .store
        .insert_event(
            EventDoc::new("host".into(), "Encuentro".into())
                .with_visibility(EventVisibility::Private),
        )
        .await
        .unwrap();

    // Direct join redirects to the request flow
    let err = f.events.join(&ana, &event_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::PrivateEventRequiresRequest);

    let request = f.events.request(&ana, &event_id, None).await.unwrap();
    let request_id = request._id.unwrap();

    // A repeat request converges on the same pending record
    let again = f.events.request(&ana, &event_id, None).await.unwrap();
    assert_eq!(again._id.unwrap(), request_id);

    // Host accepts; the requester becomes a member
    f.events
        .respond_request(&host, &request_id, true)
        .await
        .unwrap();
    assert!(f
        .store
        .membership(&event_id, "ana")
        .await
        .unwrap()
        .is_some());

    // No longer pending, so a second response is a state conflict
    let err = f
        .events
        .respond_request(&host, &request_id, false)
        .await
        .unwrap_err();
    assert_eq!(denial_of(err), Denial::RequestNotPending);
}

#[tokio::test]
async fn racing_access_requests_collapse_to_one_pending() {
    let f = fixture();
    let ana = principal("ana");
    let host = principal("host");
    let event_id = f
        .store
        .insert_event(
            EventDoc::new("host".into(), "Encuentro".into())
                .with_visibility(EventVisibility::Private),
        )
        .await
        .unwrap();

    let first = f.events.request(&ana, &event_id, None).await.unwrap();

    // A racer that got past the pending-request read is still rejected
    // store-side
    let err = f
        .store
        .insert_access_request(AccessRequestDoc::new(event_id, "ana".into(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate));

    // and the engine converges on the request that won
    let again = f.events.request(&ana, &event_id, None).await.unwrap();
    assert_eq!(again._id, first._id);

    // Once the host resolves it, nothing pending is left behind
    f.events
        .respond_request_for(&host, &event_id, "ana", true)
        .await
        .unwrap();
    assert!(f
        .store
        .pending_access_request(&event_id, "ana")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn accept_is_retryable_after_a_join_outage() {
    let f = fixture();
    let ana = principal("ana");
    let host = principal("host");
    let event_id = f
        .store
        .insert_event(
            EventDoc::new("host".into(), "Encuentro".into())
                .with_visibility(EventVisibility::Private),
        )
        .await
        .unwrap();

    let request = f.events.request(&ana, &event_id, None).await.unwrap();
    let request_id = request._id.unwrap();

    // The membership write fails; the request must stay pending
    f.store.induce_join_outage();
    let err = f
        .events
        .respond_request(&host, &request_id, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::Unavailable(_))
    ));
    let stored = f.store.access_request(&request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AccessRequestStatus::Pending);
    assert!(f
        .store
        .membership(&event_id, "ana")
        .await
        .unwrap()
        .is_none());

    // The retried accept converges to an accepted member
    let resolved = f
        .events
        .respond_request(&host, &request_id, true)
        .await
        .unwrap();
    assert_eq!(resolved.status, AccessRequestStatus::Accepted);
    assert!(f
        .store
        .membership(&event_id, "ana")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn only_host_may_respond_to_requests() {
    let f = fixture();
    let ana = principal("ana");
    let carla = principal("carla");
    let event_id = f
        .store
        .insert_event(
            EventDoc::new("host".into(), "Encuentro".into())
                .with_visibility(EventVisibility::Private),
        )
        .await
        .unwrap();

    let request = f.events.request(&ana, &event_id, None).await.unwrap();
    let err = f
        .events
        .respond_request(&carla, &request._id.unwrap(), true)
        .await
        .unwrap_err();
    assert_eq!(denial_of(err), Denial::NotAuthorized);
}

#[tokio::test]
async fn host_cannot_leave_own_event() {
    let f = fixture();
    let host = principal("host");
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Milonga".into()))
        .await
        .unwrap();

    let err = f.events.leave(&host, &event_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::HostCannotLeaveOwnEvent);
}

#[tokio::test]
async fn leave_without_membership_is_not_found() {
    let f = fixture();
    let ana = principal("ana");
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Milonga".into()))
        .await
        .unwrap();

    let err = f.events.leave(&ana, &event_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::MembershipNotFound);
}

#[tokio::test]
async fn unverified_email_cannot_join() {
    let f = fixture();
    let mut ana = principal("ana");
    ana.email_verified = false;
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Milonga".into()))
        .await
        .unwrap();

    let err = f.events.join(&ana, &event_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::EmailVerificationRequiredForJoin);
}

#[tokio::test]
async fn new_account_join_limit_enforced() {
    let f = fixture();
    let mut ana = principal("ana");
    ana.created_at = Utc::now() - Duration::days(1);

    for i in 0..3 {
        let event_id = f
            .store
            .insert_event(EventDoc::new("host".into(), format!("Milonga {}", i)))
            .await
            .unwrap();
        f.events.join(&ana, &event_id).await.unwrap();
    }

    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "One more".into()))
        .await
        .unwrap();
    let err = f.events.join(&ana, &event_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::NewAccountJoinLimitReached);
}

#[tokio::test]
async fn trip_accept_opens_exactly_one_thread() {
    let f = fixture();
    let ana = principal("ana");
    let owner = principal("duena");

    let request = f
        .trips
        .create(&ana, "duena", "buenos-aires-2026", None)
        .await
        .unwrap();
    let request_id = request._id.unwrap();

    let acceptance = f.trips.accept(&owner, &request_id).await.unwrap();
    assert_eq!(acceptance.request.status, TripRequestStatus::Accepted);

    let thread = f
        .store
        .thread_for_pair("duena", "ana")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(thread._id.unwrap(), acceptance.thread_id);
    assert_eq!(thread.participants.len(), 2);
    assert!(thread.participants.contains(&"ana".to_string()));
    assert!(thread.participants.contains(&"duena".to_string()));
    assert_eq!(f.store.thread_count(), 1);

    // A second request between the same pair reuses the thread
    let repeat = f
        .trips
        .create(&ana, "duena", "cordoba-2026", None)
        .await
        .unwrap();
    let repeat_acceptance = f
        .trips
        .accept(&owner, &repeat._id.unwrap())
        .await
        .unwrap();
    assert_eq!(repeat_acceptance.thread_id, acceptance.thread_id);
    assert_eq!(f.store.thread_count(), 1);
}

#[tokio::test]
async fn declined_trip_request_opens_no_thread() {
    let f = fixture();
    let ana = principal("ana");
    let owner = principal("duena");

    let request = f
        .trips
        .create(&ana, "duena", "buenos-aires-2026", None)
        .await
        .unwrap();

    f.trips
        .decline(&owner, &request._id.unwrap())
        .await
        .unwrap();

    assert!(f
        .store
        .thread_for_pair("duena", "ana")
        .await
        .unwrap()
        .is_none());
    assert_eq!(f.store.thread_count(), 0);
}

#[tokio::test]
async fn trip_request_role_restrictions() {
    let f = fixture();
    let ana = principal("ana");
    let owner = principal("duena");

    // Requesting one's own trip is invalid
    let err = f
        .trips
        .create(&ana, "ana", "self-trip", None)
        .await
        .unwrap_err();
    assert_eq!(denial_of(err), Denial::InvalidAction);

    let request = f
        .trips
        .create(&ana, "duena", "buenos-aires-2026", None)
        .await
        .unwrap();
    let request_id = request._id.unwrap();

    // The requester may not accept, the owner may not cancel
    let err = f.trips.accept(&ana, &request_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::NotAuthorized);
    let err = f.trips.cancel(&owner, &request_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::NotAuthorized);

    // The requester cancels; the terminal state sticks
    f.trips.cancel(&ana, &request_id).await.unwrap();
    let err = f.trips.accept(&owner, &request_id).await.unwrap_err();
    assert_eq!(denial_of(err), Denial::TripRequestNotPending);
}

#[tokio::test]
async fn completion_survives_missing_legacy_mirror() {
    let f = fixture();
    let ana = principal("ana");
    let berto = principal("berto");
    let conn = accepted_connection(&f.store, "ana", "berto").await;

    f.store.drop_legacy_schema();

    let sync = f
        .syncs
        .propose(&ana, &conn, SyncType::Training, None, None)
        .await
        .unwrap();
    let sync_id = sync._id.unwrap();
    f.syncs.respond(&berto, &sync_id, true).await.unwrap();

    // The mirror collection being absent must not fail the completion
    let completed = f.syncs.complete(&ana, &sync_id, None).await.unwrap();
    assert_eq!(completed.status, SyncStatus::Completed);
    assert_eq!(f.store.legacy_completion_count(), 0);
}

#[tokio::test]
async fn completion_mirrors_to_legacy_collection() {
    let f = fixture();
    let ana = principal("ana");
    let berto = principal("berto");
    let conn = accepted_connection(&f.store, "ana", "berto").await;

    let sync = f
        .syncs
        .propose(&ana, &conn, SyncType::Training, None, None)
        .await
        .unwrap();
    let sync_id = sync._id.unwrap();
    f.syncs.respond(&berto, &sync_id, true).await.unwrap();
    f.syncs
        .complete(&ana, &sync_id, Some("great practice".into()))
        .await
        .unwrap();

    assert_eq!(f.store.legacy_completion_count(), 1);
}

#[tokio::test]
async fn leave_frees_a_seat_for_the_next_joiner() {
    let f = fixture();
    let event_id = f
        .store
        .insert_event(EventDoc::new("host".into(), "Practica".into()).with_capacity(1))
        .await
        .unwrap();

    f.events.join(&principal("ana"), &event_id).await.unwrap();
    f.events.leave(&principal("ana"), &event_id).await.unwrap();

    // The released seat admits the next joiner directly
    let outcome = f.events.join(&principal("berto"), &event_id).await.unwrap();
    assert_eq!(outcome, MembershipOutcome::Joined { event_id });
}
