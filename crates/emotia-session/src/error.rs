use thiserror::Error;

use crate::machine::SessionStatus;

/// Rejection of a local send; nothing was transmitted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("session is {0}, not connected")]
    NotConnected(SessionStatus),

    #[error("message is empty")]
    EmptyMessage,
}

/// Inbound frame that could not be decoded
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has no type tag")]
    Untagged,
}

/// Failure to establish or use the underlying connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConnectionError(pub String);

/// A state machine event that is not valid in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} while {from}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub action: &'static str,
}
