//! HTTP route handlers
//!
//! One handler module per lifecycle surface plus health probes. All
//! handlers speak the same JSON envelope: `{"ok": true, ...}` on
//! success, `{"ok": false, "error": "<reason>"}` on failure, with the
//! HTTP status derived from the denial class or store fault.

pub mod event;
pub mod health;
pub mod sync;
pub mod trip;

pub use event::{handle_event_membership, handle_event_requests};
pub use health::{health_check, readiness_check, version_info};
pub use sync::handle_syncs;
pub use trip::handle_trip_requests;

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{resolve_principal, Principal};
use crate::engine::EngineError;
use crate::server::AppState;
use crate::store::StoreError;

pub(crate) type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const MAX_BODY_BYTES: usize = 10240;

pub(crate) fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn json_response(status: StatusCode, body: serde_json::Value) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(body.to_string()))
        .unwrap()
}

pub(crate) fn error_response(status: StatusCode, reason: &str) -> Response<BoxBody> {
    json_response(status, serde_json::json!({ "ok": false, "error": reason }))
}

/// Map an engine failure to its HTTP envelope. Denials carry their own
/// class; store faults distinguish unavailability from everything else
/// so callers can tell a retry-later from a bug.
pub(crate) fn engine_error_response(err: EngineError) -> Response<BoxBody> {
    match err {
        EngineError::Denied(denial) => {
            error_response(denial.class().status_code(), denial.reason())
        }
        EngineError::Store(StoreError::Unavailable(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
        }
        EngineError::Store(StoreError::Duplicate) => {
            error_response(StatusCode::CONFLICT, "duplicate")
        }
        EngineError::Store(StoreError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "not_found")
        }
        EngineError::Store(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

/// Read and deserialize a JSON body, with a hard size cap
pub(crate) async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, Response<BoxBody>> {
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return Err(error_response(StatusCode::BAD_REQUEST, "bad_request"));
        }
    };

    if body.len() > MAX_BODY_BYTES {
        return Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "body_too_large",
        ));
    }

    serde_json::from_slice(&body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "bad_request"))
}

/// Authenticate the request or produce the 401 envelope
pub(crate) fn require_principal(
    state: &Arc<AppState>,
    req: &Request<hyper::body::Incoming>,
) -> Result<Principal, Response<BoxBody>> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    resolve_principal(&state.jwt, header)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "not_authenticated"))
}

/// Parse a hex record id or produce the 400 envelope
pub(crate) fn parse_object_id(raw: &str) -> Result<ObjectId, Response<BoxBody>> {
    ObjectId::parse_str(raw)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "invalid_record_id"))
}
