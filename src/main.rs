//! Cabeceo - request lifecycle coordination for the dance travel network

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cabeceo::{
    auth::JwtValidator,
    config::Args,
    db::MongoClient,
    notify::{self, Notifier},
    server,
    store::{MemoryRelationshipStore, MongoRelationshipStore, RelationshipStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cabeceo={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Cabeceo - dance network coordination");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("======================================");

    let jwt = match args.jwt_secret() {
        Some(secret) => JwtValidator::new(secret, args.jwt_expiry_seconds)?,
        None => {
            error!("JWT secret missing");
            std::process::exit(1);
        }
    };

    // Connect to MongoDB (dev mode falls back to the in-memory store)
    let op_timeout = Duration::from_millis(args.store_timeout_ms);
    let (mongo, store): (Option<MongoClient>, Arc<dyn RelationshipStore>) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                let store = MongoRelationshipStore::new(&client, op_timeout).await?;
                info!("MongoDB connected successfully");
                (Some(client), Arc::new(store))
            }
            Err(e) => {
                if args.dev_mode {
                    warn!(
                        "MongoDB connection failed (dev mode, using in-memory store): {}",
                        e
                    );
                    (None, Arc::new(MemoryRelationshipStore::new()))
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    // Connect to NATS (optional; notifications are best-effort anyway)
    let notifier = if args.nats.nats_disabled {
        info!("NATS notification sink disabled");
        Arc::new(Notifier::disabled())
    } else {
        match notify::connect(&args.nats, &format!("cabeceo-{}", args.node_id)).await {
            Ok(client) => {
                info!("NATS connected successfully");
                Arc::new(Notifier::new(
                    Some(client),
                    args.notify_subject_prefix.clone(),
                ))
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("NATS connection failed (dev mode, continuing without): {}", e);
                    Arc::new(Notifier::disabled())
                } else {
                    error!("NATS connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let state = Arc::new(server::AppState::new(args, jwt, mongo, store, notifier));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
