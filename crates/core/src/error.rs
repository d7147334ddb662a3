//! Shared error taxonomy.
//!
//! Callers distinguish retryable conditions (network, timeout) from terminal
//! ones (deactivated, unauthorized). `Override` is informational: the content
//! already exists and the returned ID is valid.

use thiserror::Error;

use crate::types::RecordID;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Key absent. Recoverable; the caller decides the fallback.
    #[error("not found")]
    NotFound,

    /// Content already exists under this ID. Treated as success-with-existing-ID.
    #[error("record already exists: {id}")]
    Override { id: RecordID },

    /// Object lifeline is terminated. Definitive failure, never retried.
    #[error("object is deactivated")]
    Deactivated,

    /// A specific historical state was requested but is absent.
    #[error("object state is not available")]
    StateNotAvailable,

    /// Sender is not entitled to act for this object/role/pulse.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid delegation token")]
    InvalidToken,

    /// Bit-set index beyond the mapper length. Fatal to the consensus round.
    #[error("bit set index out of range")]
    OutOfRange,

    /// Node reference is not known to the bit-set mapper.
    #[error("node is missing from the bit set mapper")]
    NodeMissing,

    /// Phase deadline exceeded. Logged; the round proceeds degraded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The replay tape has no recorded reply for this message.
    #[error("no reply for this message in the tape")]
    NoReply,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether this error is the informational dedup signal.
    pub fn is_override(&self) -> bool {
        matches!(self, CoreError::Override { .. })
    }

    /// Collapse an `Override` result into its carried ID. Any other error
    /// passes through.
    pub fn override_id(result: Result<RecordID, CoreError>) -> Result<RecordID, CoreError> {
        match result {
            Ok(id) => Ok(id),
            Err(CoreError::Override { id }) => Ok(id),
            Err(e) => Err(e),
        }
    }

    /// Rebuild a taxonomy variant from the display form a remote handler
    /// serialized into an error reply. Unknown strings stay opaque.
    pub fn from_wire(s: &str) -> CoreError {
        match s {
            "not found" => CoreError::NotFound,
            "object is deactivated" => CoreError::Deactivated,
            "object state is not available" => CoreError::StateNotAvailable,
            "invalid signature" => CoreError::InvalidSignature,
            "invalid delegation token" => CoreError::InvalidToken,
            _ => match s.strip_prefix("unauthorized: ") {
                Some(rest) => CoreError::Unauthorized(rest.to_string()),
                None => CoreError::Other(s.to_string()),
            },
        }
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
