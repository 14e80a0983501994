//! Sync lifecycle routes
//!
//! `POST /api/v1/syncs` with an action-tagged body. Every action acts
//! on behalf of the authenticated principal; the recipient of a
//! proposal is derived server-side from the connection.

use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::db::schemas::{SyncDoc, SyncType};
use crate::routes::{
    engine_error_response, error_response, json_response, parse_json_body, parse_object_id,
    require_principal, BoxBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SyncAction {
    Propose {
        connection_id: String,
        #[serde(default)]
        sync_type: SyncType,
        scheduled_at: Option<String>,
        note: Option<String>,
    },
    Accept {
        sync_id: String,
    },
    Decline {
        sync_id: String,
    },
    Cancel {
        sync_id: String,
    },
    Complete {
        sync_id: String,
        note: Option<String>,
    },
}

fn sync_body(sync: &SyncDoc) -> serde_json::Value {
    json!({
        "ok": true,
        "sync": {
            "id": sync._id.map(|id| id.to_hex()),
            "connection_id": sync.connection_id.to_hex(),
            "requester": sync.requester,
            "recipient": sync.recipient,
            "sync_type": sync.sync_type,
            "status": sync.status.as_str(),
            "scheduled_at": sync.scheduled_at.and_then(|d| d.try_to_rfc3339_string().ok()),
            "note": sync.note,
            "completed_at": sync.completed_at.and_then(|d| d.try_to_rfc3339_string().ok()),
        }
    })
}

/// POST /api/v1/syncs
pub async fn handle_syncs(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let principal = match require_principal(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let action: SyncAction = match parse_json_body(req).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let result = match action {
        SyncAction::Propose {
            connection_id,
            sync_type,
            scheduled_at,
            note,
        } => {
            let connection_id = match parse_object_id(&connection_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            let scheduled_at = match scheduled_at {
                Some(raw) => match chrono::DateTime::parse_from_rfc3339(&raw) {
                    Ok(dt) => Some(bson::DateTime::from_chrono(dt.with_timezone(&chrono::Utc))),
                    Err(_) => {
                        return error_response(StatusCode::BAD_REQUEST, "invalid_scheduled_at")
                    }
                },
                None => None,
            };
            state
                .syncs
                .propose(&principal, &connection_id, sync_type, scheduled_at, note)
                .await
        }
        SyncAction::Accept { sync_id } => {
            let sync_id = match parse_object_id(&sync_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            state.syncs.respond(&principal, &sync_id, true).await
        }
        SyncAction::Decline { sync_id } => {
            let sync_id = match parse_object_id(&sync_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            state.syncs.respond(&principal, &sync_id, false).await
        }
        SyncAction::Cancel { sync_id } => {
            let sync_id = match parse_object_id(&sync_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            state.syncs.cancel(&principal, &sync_id).await
        }
        SyncAction::Complete { sync_id, note } => {
            let sync_id = match parse_object_id(&sync_id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            state.syncs.complete(&principal, &sync_id, note).await
        }
    };

    match result {
        Ok(sync) => json_response(StatusCode::OK, sync_body(&sync)),
        Err(e) => engine_error_response(e),
    }
}
