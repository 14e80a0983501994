//! Transition notification sink
//!
//! Publishes one NATS event per successful lifecycle transition, tagged
//! with the affected principal. Delivery is best-effort: publish
//! failures are logged and never surfaced to the caller, and a missing
//! NATS connection disables the sink entirely.

use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NatsArgs;
use crate::types::CabeceoError;

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Connect to NATS for notification publishing
pub async fn connect(args: &NatsArgs, name: &str) -> Result<Client, CabeceoError> {
    info!("Connecting to NATS at {}", args.nats_url);

    // Fast failure if NATS isn't available; reconnection still works
    // after the initial successful connection.
    let mut options = ConnectOptions::new()
        .name(name)
        .ping_interval(DEFAULT_PING_INTERVAL)
        .connection_timeout(Duration::from_secs(5));

    if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
        options = options.user_and_password(user.clone(), pass.clone());
    }

    let client = options
        .connect(&args.nats_url)
        .await
        .map_err(|e| CabeceoError::Nats(format!("Failed to connect: {}", e)))?;

    info!("Connected to NATS at {}", args.nats_url);
    Ok(client)
}

/// One notification event, consumed by polling or push delivery outside
/// this core
#[derive(Debug, Serialize)]
pub struct TransitionEvent<'a> {
    /// e.g. "trip_request_accepted"
    pub kind: &'a str,
    /// Principal the event is for
    pub principal: &'a str,
    /// Affected record id (hex)
    pub record_id: String,
    /// Event timestamp (RFC 3339)
    pub at: String,
}

/// Best-effort notification publisher
pub struct Notifier {
    client: Option<Client>,
    subject_prefix: String,
}

impl Notifier {
    pub fn new(client: Option<Client>, subject_prefix: String) -> Self {
        if client.is_none() {
            info!("Notification sink disabled (no NATS connection)");
        }
        Self {
            client,
            subject_prefix,
        }
    }

    /// A notifier that drops everything (dev mode, tests)
    pub fn disabled() -> Self {
        Self {
            client: None,
            subject_prefix: String::new(),
        }
    }

    /// Publish one transition event for the given principal. Failures
    /// are logged, never propagated.
    pub async fn transition(&self, kind: &'static str, principal: &str, record_id: String) {
        let client = match &self.client {
            Some(c) => c,
            None => return,
        };

        let event = TransitionEvent {
            kind,
            principal,
            record_id,
            at: chrono::Utc::now().to_rfc3339(),
        };

        let subject = format!("{}.{}", self.subject_prefix, principal);
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!(kind, error = %e, "Failed to serialize notification");
                return;
            }
        };

        match client.publish(subject, Bytes::from(payload)).await {
            Ok(()) => debug!(kind, principal, "Published transition notification"),
            Err(e) => warn!(kind, principal, error = %e, "Notification publish failed"),
        }
    }
}
