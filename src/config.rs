//! Configuration for Cabeceo
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Cabeceo - membership and request-lifecycle coordination service
#[derive(Parser, Debug, Clone)]
#[command(name = "cabeceo")]
#[command(about = "Request lifecycle coordination for the dance travel network")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store, permissive JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "cabeceo")]
    pub mongodb_db: String,

    /// JWT secret for token verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds (for tokens this node issues in dev mode)
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Per-operation store timeout in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Require a verified email before joining events
    #[arg(long, env = "JOIN_REQUIRE_VERIFIED_EMAIL", default_value = "true")]
    pub join_require_verified_email: bool,

    /// Accounts younger than this many days are join-throttled
    #[arg(long, env = "NEW_ACCOUNT_AGE_DAYS", default_value = "7")]
    pub new_account_age_days: i64,

    /// Maximum event joins for a new account within the join window
    #[arg(long, env = "NEW_ACCOUNT_JOIN_LIMIT", default_value = "3")]
    pub new_account_join_limit: u64,

    /// Join-throttle window in hours
    #[arg(long, env = "JOIN_WINDOW_HOURS", default_value = "24")]
    pub join_window_hours: i64,

    /// NATS subject prefix for transition notifications
    #[arg(long, env = "NOTIFY_SUBJECT_PREFIX", default_value = "cabeceo.notify")]
    pub notify_subject_prefix: String,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Disable the NATS notification sink entirely
    #[arg(long, env = "NATS_DISABLED", default_value = "false")]
    pub nats_disabled: bool,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        if self.dev_mode {
            Some(
                self.jwt_secret
                    .clone()
                    .unwrap_or_else(|| "dev-only-insecure-secret-0123456789abcdef".to_string()),
            )
        } else {
            self.jwt_secret.clone()
        }
    }

    /// Join throttling policy derived from config
    pub fn join_policy(&self) -> JoinPolicy {
        JoinPolicy {
            require_verified_email: self.join_require_verified_email,
            new_account_age_days: self.new_account_age_days,
            new_account_join_limit: self.new_account_join_limit,
            join_window_hours: self.join_window_hours,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.new_account_age_days < 0 || self.join_window_hours <= 0 {
            return Err("join throttle windows must be positive".to_string());
        }

        Ok(())
    }
}

/// Abuse-control policy applied to event joins
#[derive(Debug, Clone, Copy)]
pub struct JoinPolicy {
    pub require_verified_email: bool,
    pub new_account_age_days: i64,
    pub new_account_join_limit: u64,
    pub join_window_hours: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_dev_mode_defaults_secret() {
        let args = Args::parse_from(["cabeceo", "--dev-mode"]);
        assert!(args.jwt_secret().is_some());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let args = Args::parse_from(["cabeceo"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["cabeceo", "--jwt-secret", "0123456789abcdef0123456789abcdef"]);
        assert!(args.validate().is_ok());
    }
}
