//! Shared types for Cabeceo

mod error;

pub use error::{CabeceoError, Result};
