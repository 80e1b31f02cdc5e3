use thiserror::Error;

use crate::session::SessionStatus;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A session transition was attempted from a state that does not allow it.
    /// The session is left untouched.
    #[error("cannot {operation} while session is {status:?}")]
    InvalidSessionState {
        operation: &'static str,
        status: SessionStatus,
    },

    /// The pretrained artifact could not be used. Recovered by the loader.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl EngineError {
    pub(crate) fn invalid_state(operation: &'static str, status: SessionStatus) -> Self {
        EngineError::InvalidSessionState { operation, status }
    }
}
