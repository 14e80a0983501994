//! Lifecycle engines
//!
//! Three peer state machines - connection syncs, event membership, trip
//! requests - each validating and applying one transition per
//! invocation. They share the guarded-transition shape in [`guard`],
//! the pure authorization predicates in [`authz`], and the denial
//! taxonomy in [`denial`].

pub mod authz;
pub mod denial;
pub mod event;
pub mod guard;
pub mod sync;
pub mod trip;

pub use denial::{Denial, ResponseClass};
pub use event::EventEngine;
pub use sync::SyncEngine;
pub use trip::TripEngine;

use crate::store::StoreError;

/// Failure of an engine invocation: either a classified denial or a
/// store-layer fault.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{}", .0.reason())]
    Denied(Denial),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<Denial> for EngineError {
    fn from(denial: Denial) -> Self {
        Self::Denied(denial)
    }
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
