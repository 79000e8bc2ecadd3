//! Error taxonomy for the research core.
//!
//! Transport failures are fatal to the call that triggered them; tool
//! failures are captured as data and never surface here. Hook interrupts
//! are control flow (`HookDecision::Interrupt`), not errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Network/model failure from the completion transport. Not retried
    /// internally; retry policy belongs to the caller.
    #[error("transport error: {0}")]
    Transport(String),

    /// Engine or session setup failed (e.g. server-side session creation).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation referenced a planning item id that does not exist.
    #[error("unknown planning item: {id}")]
    UnknownItem { id: String },

    /// A caller-supplied parameter failed validation.
    #[error("invalid parameter: {parameter}")]
    InvalidParameter { parameter: String },

    /// The planner ran to completion without saving a decomposition.
    /// Distinct from a plan with zero items.
    #[error("planner produced no plan")]
    NoPlan,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state store error: {0}")]
    Store(String),
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
