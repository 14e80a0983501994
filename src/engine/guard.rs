//! Generic guarded-transition shape
//!
//! The three lifecycle engines share one sequence: authenticate, load,
//! check participation, check role restriction, check state
//! precondition, write conditionally. The role and state checks are the
//! part that would otherwise be duplicated five ways; a [`Transition`]
//! captures them as data.

use crate::engine::denial::Denial;

/// Which side of a two-party record the acting principal is on.
///
/// For a sync the initiator is the proposer and the counterparty the
/// recipient; for a trip request the initiator is the requester and the
/// counterparty the trip owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Initiator,
    Counterparty,
}

/// Which party a transition is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRule {
    InitiatorOnly,
    CounterpartyOnly,
    Either,
}

/// A single permitted transition: source states, target, actor rule,
/// and the denial reported when the state precondition fails.
#[derive(Debug, Clone, Copy)]
pub struct Transition<S: 'static> {
    pub from: &'static [S],
    pub to: S,
    pub role: RoleRule,
    pub wrong_state: Denial,
}

impl<S: PartialEq + Copy> Transition<S> {
    /// Apply the role restriction then the state precondition, in the
    /// fixed evaluation order. First failing rule wins.
    pub fn authorize(&self, current: S, party: Party) -> Result<(), Denial> {
        match (self.role, party) {
            (RoleRule::InitiatorOnly, Party::Counterparty)
            | (RoleRule::CounterpartyOnly, Party::Initiator) => {
                return Err(Denial::NotAuthorized);
            }
            _ => {}
        }

        if !self.from.contains(&current) {
            return Err(self.wrong_state);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::SyncStatus;

    const ACCEPT: Transition<SyncStatus> = Transition {
        from: &[SyncStatus::Pending],
        to: SyncStatus::Accepted,
        role: RoleRule::CounterpartyOnly,
        wrong_state: Denial::SyncNotPending,
    };

    #[test]
    fn test_role_checked_before_state() {
        // An initiator poking a terminal record is told about the role,
        // not the state
        let err = ACCEPT
            .authorize(SyncStatus::Completed, Party::Initiator)
            .unwrap_err();
        assert_eq!(err, Denial::NotAuthorized);
    }

    #[test]
    fn test_state_precondition() {
        let err = ACCEPT
            .authorize(SyncStatus::Completed, Party::Counterparty)
            .unwrap_err();
        assert_eq!(err, Denial::SyncNotPending);

        assert!(ACCEPT
            .authorize(SyncStatus::Pending, Party::Counterparty)
            .is_ok());
    }
}
