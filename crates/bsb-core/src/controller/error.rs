//! Controller errors

use thiserror::Error;

use crate::fields::FieldError;
use crate::protocol::ProtocolError;

/// Errors returned by the controller API
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Name not in the registry
    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    /// Value does not fit the field type
    #[error("Failed to encode value: {0}")]
    Encode(#[from] FieldError),

    /// Sending or receiving failed
    #[error("Bus error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Query went unanswered
    #[error("No reply for {0}")]
    RequestTimeout(String),

    /// Monitor thread is not running
    #[error("Controller is stopped")]
    Stopped,

    /// `start` called twice
    #[error("Controller already started")]
    AlreadyStarted,

    /// A worker thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    Thread(std::io::Error),
}
