//! Authorization predicates
//!
//! Pure classification only: given the acting principal and the loaded
//! record(s), decide which side of the record the principal is on, or
//! which denial applies. Nothing here mutates state.

use chrono::{Duration, Utc};

use crate::auth::Principal;
use crate::config::JoinPolicy;
use crate::db::schemas::{
    ConnectionDoc, EventAdmission, EventDoc, EventVisibility, SyncDoc, TripRequestDoc,
};
use crate::engine::denial::Denial;
use crate::engine::guard::Party;

/// Which side of a sync the principal is on
pub fn sync_party(sync: &SyncDoc, principal: &Principal) -> Result<Party, Denial> {
    if sync.requester == principal.id {
        Ok(Party::Initiator)
    } else if sync.recipient == principal.id {
        Ok(Party::Counterparty)
    } else {
        Err(Denial::NotAuthorized)
    }
}

/// Which side of a trip request the principal is on
pub fn trip_party(trip: &TripRequestDoc, principal: &Principal) -> Result<Party, Denial> {
    if trip.requester == principal.id {
        Ok(Party::Initiator)
    } else if trip.owner == principal.id {
        Ok(Party::Counterparty)
    } else {
        Err(Denial::NotAuthorized)
    }
}

/// A sync may only be proposed on an accepted connection, by one of its
/// two participants.
pub fn check_sync_proposal(connection: &ConnectionDoc, principal: &Principal) -> Result<(), Denial> {
    if !connection.is_participant(&principal.id) {
        return Err(Denial::NotAuthorized);
    }

    if connection.status != crate::db::schemas::ConnectionStatus::Accepted {
        return Err(Denial::ConnectionNotAccepted);
    }

    Ok(())
}

/// Admission rules for a direct join. Hidden beats closed beats private.
pub fn check_event_admission(event: &EventDoc) -> Result<(), Denial> {
    match event.admission {
        EventAdmission::Hidden => return Err(Denial::EventHidden),
        EventAdmission::Closed => return Err(Denial::EventNotOpen),
        EventAdmission::Open => {}
    }

    if event.visibility == EventVisibility::Private {
        return Err(Denial::PrivateEventRequiresRequest);
    }

    Ok(())
}

/// Abuse-control checks for a join. Not retried automatically; the
/// denial tells the caller why.
pub fn check_join_throttle(
    policy: &JoinPolicy,
    principal: &Principal,
    recent_joins: u64,
) -> Result<(), Denial> {
    if policy.require_verified_email && !principal.email_verified {
        return Err(Denial::EmailVerificationRequiredForJoin);
    }

    let account_age = Utc::now() - principal.created_at;
    if account_age < Duration::days(policy.new_account_age_days)
        && recent_joins >= policy.new_account_join_limit
    {
        return Err(Denial::NewAccountJoinLimitReached);
    }

    Ok(())
}

/// Whether a throttle check even needs the recent-join count (skips a
/// store read for established accounts)
pub fn join_throttle_applies(policy: &JoinPolicy, principal: &Principal) -> bool {
    let account_age = Utc::now() - principal.created_at;
    account_age < Duration::days(policy.new_account_age_days)
}

/// Only the host may respond to an access request for their event
pub fn check_event_host(event: &EventDoc, principal: &Principal) -> Result<(), Denial> {
    if event.host != principal.id {
        return Err(Denial::NotAuthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ConnectionStatus, SyncType};
    use bson::oid::ObjectId;

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

    #[test]
    fn test_sync_party() {
        let sync = SyncDoc::new(
            ObjectId::new(),
            "ana".into(),
            "berto".into(),
            SyncType::Training,
            None,
            None,
        );
        assert_eq!(sync_party(&sync, &principal("ana")).unwrap(), Party::Initiator);
        assert_eq!(
            sync_party(&sync, &principal("berto")).unwrap(),
            Party::Counterparty
        );
        assert_eq!(
            sync_party(&sync, &principal("carla")).unwrap_err(),
            Denial::NotAuthorized
        );
    }

    #[test]
    fn test_sync_proposal_requires_accepted_connection() {
        let conn = ConnectionDoc::new("ana".into(), "berto".into(), ConnectionStatus::Pending);
        assert_eq!(
            check_sync_proposal(&conn, &principal("ana")).unwrap_err(),
            Denial::ConnectionNotAccepted
        );

        // Participation is checked before connection state
        assert_eq!(
            check_sync_proposal(&conn, &principal("carla")).unwrap_err(),
            Denial::NotAuthorized
        );

        let conn = ConnectionDoc::new("ana".into(), "berto".into(), ConnectionStatus::Accepted);
        assert!(check_sync_proposal(&conn, &principal("berto")).is_ok());
    }

    #[test]
    fn test_event_admission_order() {
        let event = EventDoc::new("host".into(), "Encuentro".into())
            .with_admission(EventAdmission::Hidden)
            .with_visibility(EventVisibility::Private);
        assert_eq!(check_event_admission(&event).unwrap_err(), Denial::EventHidden);

        let event = EventDoc::new("host".into(), "Encuentro".into())
            .with_admission(EventAdmission::Closed);
        assert_eq!(check_event_admission(&event).unwrap_err(), Denial::EventNotOpen);

        let event = EventDoc::new("host".into(), "Encuentro".into())
            .with_visibility(EventVisibility::Private);
        assert_eq!(
            check_event_admission(&event).unwrap_err(),
            Denial::PrivateEventRequiresRequest
        );

        let event = EventDoc::new("host".into(), "Encuentro".into());
        assert!(check_event_admission(&event).is_ok());
    }

    #[test]
    fn test_join_throttle() {
        let mut unverified = principal("ana");
        unverified.email_verified = false;
        assert_eq!(
            check_join_throttle(&policy(), &unverified, 0).unwrap_err(),
            Denial::EmailVerificationRequiredForJoin
        );

        let mut fresh = principal("berto");
        fresh.created_at = Utc::now() - Duration::days(1);
        assert_eq!(
            check_join_throttle(&policy(), &fresh, 3).unwrap_err(),
            Denial::NewAccountJoinLimitReached
        );
        assert!(check_join_throttle(&policy(), &fresh, 2).is_ok());

        // Established accounts are not join-limited
        assert!(check_join_throttle(&policy(), &principal("carla"), 100).is_ok());
    }
}
