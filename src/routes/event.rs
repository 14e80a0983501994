//! Event membership and access-request routes
//!
//! `POST /api/v1/events/membership` covers the requester side: join,
//! leave, request access, withdraw a request. `action` defaults to
//! `join` so a bare `{"event_id": ...}` body joins.
//!
//! `POST /api/v1/events/requests` covers the host side: accept or
//! decline a pending access request, addressed either by request id or
//! by (event, requester) pair.

use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::db::schemas::AccessRequestDoc;
use crate::engine::event::MembershipOutcome;
use crate::routes::{
    engine_error_response, error_response, json_response, parse_json_body, parse_object_id,
    require_principal, BoxBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum MembershipVerb {
    #[default]
    Join,
    Leave,
    Request,
    CancelRequest,
}

#[derive(Debug, Deserialize)]
struct MembershipRequest {
    event_id: String,
    #[serde(default)]
    action: MembershipVerb,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RequestResponseAction {
    Accept {
        request_id: Option<String>,
        event_id: Option<String>,
        requester: Option<String>,
    },
    Decline {
        request_id: Option<String>,
        event_id: Option<String>,
        requester: Option<String>,
    },
}

fn request_body(request: &AccessRequestDoc) -> serde_json::Value {
    json!({
        "ok": true,
        "request": {
            "id": request._id.map(|id| id.to_hex()),
            "event_id": request.event_id.to_hex(),
            "requester": request.requester,
            "status": request.status.as_str(),
            "note": request.note,
        }
    })
}

/// POST /api/v1/events/membership
pub async fn handle_event_membership(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let principal = match require_principal(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let body: MembershipRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let event_id = match parse_object_id(&body.event_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match body.action {
        MembershipVerb::Join => match state.events.join(&principal, &event_id).await {
            Ok(outcome) => membership_response(&outcome),
            Err(e) => engine_error_response(e),
        },
        MembershipVerb::Leave => match state.events.leave(&principal, &event_id).await {
            Ok(outcome) => membership_response(&outcome),
            Err(e) => engine_error_response(e),
        },
        MembershipVerb::Request => {
            match state.events.request(&principal, &event_id, body.note).await {
                Ok(request) => json_response(StatusCode::OK, request_body(&request)),
                Err(e) => engine_error_response(e),
            }
        }
        MembershipVerb::CancelRequest => {
            match state.events.cancel_request(&principal, &event_id).await {
                Ok(()) => json_response(StatusCode::OK, json!({ "ok": true })),
                Err(e) => engine_error_response(e),
            }
        }
    }
}

fn membership_response(outcome: &MembershipOutcome) -> Response<BoxBody> {
    let event_id = match outcome {
        MembershipOutcome::Joined { event_id }
        | MembershipOutcome::Waitlisted { event_id }
        | MembershipOutcome::Left { event_id } => event_id,
    };
    json_response(
        StatusCode::OK,
        json!({
            "ok": true,
            "event_id": event_id.to_hex(),
            "state": outcome.state(),
        }),
    )
}

/// POST /api/v1/events/requests
pub async fn handle_event_requests(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let principal = match require_principal(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let action: RequestResponseAction = match parse_json_body(req).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let (accept, request_id, event_id, requester) = match action {
        RequestResponseAction::Accept {
            request_id,
            event_id,
            requester,
        } => (true, request_id, event_id, requester),
        RequestResponseAction::Decline {
            request_id,
            event_id,
            requester,
        } => (false, request_id, event_id, requester),
    };

    let result = if let Some(raw) = request_id {
        let request_id = match parse_object_id(&raw) {
            Ok(id) => id,
            Err(resp) => return resp,
        };
        state
            .events
            .respond_request(&principal, &request_id, accept)
            .await
    } else if let (Some(raw), Some(requester)) = (event_id, requester) {
        let event_id = match parse_object_id(&raw) {
            Ok(id) => id,
            Err(resp) => return resp,
        };
        state
            .events
            .respond_request_for(&principal, &event_id, &requester, accept)
            .await
    } else {
        return error_response(StatusCode::BAD_REQUEST, "bad_request");
    };

    match result {
        Ok(request) => json_response(StatusCode::OK, request_body(&request)),
        Err(e) => engine_error_response(e),
    }
}
