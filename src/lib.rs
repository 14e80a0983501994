//! Cabeceo - membership and request-lifecycle coordination
//!
//! A cabeceo is the glance that asks for a dance. This service arbitrates
//! the asks of a social dance travel network: connection syncs, event
//! membership, and trip requests, each advanced through a small lifecycle
//! (pending -> accepted/declined/cancelled/completed) under strict
//! authorization rules.
//!
//! ## Components
//!
//! - **Auth**: JWT bearer credential -> acting principal
//! - **Store**: typed adapter over MongoDB (or in-memory in dev mode)
//! - **Engines**: three peer lifecycle state machines sharing one
//!   guarded-transition shape (sync, event membership, trip request)
//! - **Routes**: action-tagged entry points, one per resource kind
//! - **Notify**: best-effort NATS event per successful transition

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod notify;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CabeceoError, Result};
