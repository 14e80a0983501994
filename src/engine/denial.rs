//! Denial reasons and the response classifier
//!
//! Every way a lifecycle transition can be refused is a variant here,
//! and `Denial::class` is a total function over the enum, so a new
//! reason cannot compile without choosing its response class. The
//! caller-visible error string is the snake_case reason itself.

use hyper::StatusCode;

/// Specific reason a transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    // Authentication
    NotAuthenticated,

    // Participation / role restriction
    NotAuthorized,

    // Existence
    ConnectionNotFound,
    SyncNotFound,
    EventNotFound,
    RequestNotFound,
    TripRequestNotFound,
    MembershipNotFound,

    // State preconditions
    ConnectionNotAccepted,
    SyncNotPending,
    SyncNotAccepted,
    RequestNotPending,
    RequestNotFoundOrNotPending,
    TripRequestNotPending,
    EventNotOpen,
    EventHidden,
    AlreadyJoinedOrWaitlisted,
    HostCannotLeaveOwnEvent,
    PrivateEventRequiresRequest,
    EventIsPublic,
    InvalidAction,

    // Abuse / rate control
    EmailVerificationRequiredForJoin,
    NewAccountJoinLimitReached,
}

/// Response class a denial maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
}

impl ResponseClass {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl Denial {
    /// Caller-visible reason string
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::NotAuthorized => "not_authorized",
            Self::ConnectionNotFound => "connection_not_found",
            Self::SyncNotFound => "sync_not_found",
            Self::EventNotFound => "event_not_found",
            Self::RequestNotFound => "request_not_found",
            Self::TripRequestNotFound => "trip_request_not_found",
            Self::MembershipNotFound => "membership_not_found",
            Self::ConnectionNotAccepted => "connection_not_accepted",
            Self::SyncNotPending => "sync_not_pending",
            Self::SyncNotAccepted => "sync_not_accepted",
            Self::RequestNotPending => "request_not_pending",
            Self::RequestNotFoundOrNotPending => "request_not_found_or_not_pending",
            Self::TripRequestNotPending => "trip_request_not_pending",
            Self::EventNotOpen => "event_not_open",
            Self::EventHidden => "event_hidden",
            Self::AlreadyJoinedOrWaitlisted => "already_joined_or_waitlisted",
            Self::HostCannotLeaveOwnEvent => "host_cannot_leave_own_event",
            Self::PrivateEventRequiresRequest => "private_event_requires_request",
            Self::EventIsPublic => "event_is_public",
            Self::InvalidAction => "invalid_action",
            Self::EmailVerificationRequiredForJoin => "email_verification_required_for_join",
            Self::NewAccountJoinLimitReached => "new_account_join_limit_reached",
        }
    }

    /// Map the reason to its response class. Exhaustive by construction.
    pub fn class(&self) -> ResponseClass {
        match self {
            Self::NotAuthenticated => ResponseClass::Unauthenticated,

            Self::NotAuthorized => ResponseClass::Forbidden,

            Self::ConnectionNotFound
            | Self::SyncNotFound
            | Self::EventNotFound
            | Self::RequestNotFound
            | Self::TripRequestNotFound
            | Self::MembershipNotFound => ResponseClass::NotFound,

            Self::ConnectionNotAccepted
            | Self::SyncNotPending
            | Self::SyncNotAccepted
            | Self::RequestNotPending
            | Self::RequestNotFoundOrNotPending
            | Self::TripRequestNotPending
            | Self::EventNotOpen
            | Self::EventHidden
            | Self::AlreadyJoinedOrWaitlisted
            | Self::HostCannotLeaveOwnEvent
            | Self::PrivateEventRequiresRequest
            | Self::EventIsPublic
            | Self::InvalidAction => ResponseClass::Conflict,

            Self::EmailVerificationRequiredForJoin | Self::NewAccountJoinLimitReached => {
                ResponseClass::RateLimited
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings_are_snake_case() {
        for denial in [
            Denial::NotAuthenticated,
            Denial::NotAuthorized,
            Denial::SyncNotPending,
            Denial::HostCannotLeaveOwnEvent,
            Denial::NewAccountJoinLimitReached,
        ] {
            let reason = denial.reason();
            assert!(reason
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            Denial::NotAuthenticated.class().status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Denial::NotAuthorized.class().status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Denial::SyncNotFound.class().status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Denial::SyncNotPending.class().status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Denial::NewAccountJoinLimitReached.class().status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
