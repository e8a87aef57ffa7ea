// ============================================================================
// error.rs — slimetrail
// Error taxonomy shared by the session, both substrates and the hosts.
// ============================================================================

use thiserror::Error;

/// Every failure the simulation core can report to its host.
#[derive(Debug, Error)]
pub enum SimError {
    /// Required compute backend is missing, or adapter/device request failed.
    /// Permanent: the host is expected to fall back to a static presentation.
    #[error("compute capability unavailable: {0}")]
    Capability(String),

    /// Buffer or texture allocation failed.
    #[error("failed to allocate {what} ({bytes} bytes): {reason}")]
    ResourceExhausted {
        what: String,
        bytes: u64,
        reason: String,
    },

    /// A single frame's dispatch failed; buffer roles may be inconsistent.
    #[error("frame dispatch failed: {0}")]
    Frame(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Collaborator input with the wrong shape (e.g. attraction field size).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot {op} while session is {state}")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl SimError {
    /// Errors that move a session to Errored.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::Capability(_) | SimError::ResourceExhausted { .. } | SimError::Frame(_)
        )
    }
}
