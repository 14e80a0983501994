//! Trip request routes
//!
//! `POST /api/v1/trips/requests` with an action-tagged body. Accepting
//! a request reports the thread it opened alongside the updated record.

use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::db::schemas::TripRequestDoc;
use crate::routes::{
    engine_error_response, json_response, parse_json_body, parse_object_id, require_principal,
    BoxBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum TripAction {
    Create {
        owner: String,
        trip: String,
        note: Option<String>,
    },
    Accept {
        request_id: String,
    },
    Decline {
        request_id: String,
    },
    Cancel {
        request_id: String,
    },
}

fn trip_body(request: &TripRequestDoc, thread_id: Option<bson::oid::ObjectId>) -> serde_json::Value {
    let mut body = json!({
        "ok": true,
        "request": {
            "id": request._id.map(|id| id.to_hex()),
            "owner": request.owner,
            "requester": request.requester,
            "trip": request.trip,
            "status": request.status.as_str(),
            "note": request.note,
        }
    });
    if let Some(thread_id) = thread_id {
        body["thread_id"] = json!(thread_id.to_hex());
    }
    body
}

/// POST /api/v1/trips/requests
pub async fn handle_trip_requests(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let principal = match require_principal(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let action: TripAction = match parse_json_body(req).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match action {
        TripAction::Create { owner, trip, note } => {
            match state.trips.create(&principal, &owner, &trip, note).await {
                Ok(request) => json_response(StatusCode::OK, trip_body(&request, None)),
                Err(e) => engine_error_response(e),
            }
        }
        TripAction::Accept { request_id } => {
            let request_id = match parse_object_id(&request_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match state.trips.accept(&principal, &request_id).await {
                Ok(acceptance) => json_response(
                    StatusCode::OK,
                    trip_body(&acceptance.request, Some(acceptance.thread_id)),
                ),
                Err(e) => engine_error_response(e),
            }
        }
        TripAction::Decline { request_id } => {
            let request_id = match parse_object_id(&request_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match state.trips.decline(&principal, &request_id).await {
                Ok(request) => json_response(StatusCode::OK, trip_body(&request, None)),
                Err(e) => engine_error_response(e),
            }
        }
        TripAction::Cancel { request_id } => {
            let request_id = match parse_object_id(&request_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match state.trips.cancel(&principal, &request_id).await {
                Ok(request) => json_response(StatusCode::OK, trip_body(&request, None)),
                Err(e) => engine_error_response(e),
            }
        }
    }
}
