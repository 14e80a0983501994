//! MongoDB access layer
//!
//! Typed collection wrapper plus the document schemas for the
//! relationship records this service coordinates.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
