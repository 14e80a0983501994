//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one spawned task per connection. Routing
//! is a flat method/path match; all lifecycle surfaces are POST with an
//! action-tagged JSON body.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::MongoClient;
use crate::engine::{EventEngine, SyncEngine, TripEngine};
use crate::notify::Notifier;
use crate::routes;
use crate::store::RelationshipStore;
use crate::types::CabeceoError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub jwt: JwtValidator,
    /// Present when backed by MongoDB; None in dev memory mode
    pub mongo: Option<MongoClient>,
    pub store: Arc<dyn RelationshipStore>,
    pub notifier: Arc<Notifier>,
    pub syncs: SyncEngine,
    pub events: EventEngine,
    pub trips: TripEngine,
}

impl AppState {
    pub fn new(
        args: Args,
        jwt: JwtValidator,
        mongo: Option<MongoClient>,
        store: Arc<dyn RelationshipStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let syncs = SyncEngine::new(Arc::clone(&store), Arc::clone(&notifier));
        let events = EventEngine::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            args.join_policy(),
        );
        let trips = TripEngine::new(Arc::clone(&store), Arc::clone(&notifier));

        Self {
            args,
            jwt,
            mongo,
            store,
            notifier,
            syncs,
            events,
            trips,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), CabeceoError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Cabeceo listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - permissive defaults in effect");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state)).await
        }
        (Method::GET, "/health/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state)).await
        }
        (Method::GET, "/version") => routes::version_info(),

        (Method::OPTIONS, _) => preflight_response(),

        (Method::POST, "/api/v1/syncs") => routes::handle_syncs(req, state).await,
        (Method::POST, "/api/v1/events/membership") => {
            routes::handle_event_membership(req, state).await
        }
        (Method::POST, "/api/v1/events/requests") => {
            routes::handle_event_requests(req, state).await
        }
        (Method::POST, "/api/v1/trips/requests") => {
            routes::handle_trip_requests(req, state).await
        }

        _ => not_found_response(&path),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<BoxBody> {
    let body = serde_json::json!({
        "ok": false,
        "error": "not_found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(full_body(body.to_string()))
        .unwrap()
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}
