//! Error types for the realtime hub.

use crate::hub::SessionId;
use thiserror::Error;

/// Failures seen by the hub, a session loop or a transport.
///
/// None of these escape a single session: the session that hit one is torn
/// down and every other session keeps running.
#[derive(Debug, Error)]
pub enum HubError {
    /// The coordinator task has stopped.
    #[error("hub has shut down")]
    Shutdown,

    #[error("session {0} is not registered")]
    UnknownSession(SessionId),

    #[error("transport failure: {0}")]
    Transport(String),

    /// An inbound payload that is not a valid envelope.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no liveness pong for {0:?}")]
    LivenessTimeout(std::time::Duration),
}

/// Rejection returned by an [`ActionHandler`](crate::ActionHandler).
///
/// Sent back to the acting session as an `error` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

impl ActionError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<jutland_core::CoreError> for ActionError {
    fn from(err: jutland_core::CoreError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

pub type HubResult<T> = Result<T, HubError>;
