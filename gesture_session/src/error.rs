use gesture_protocol::Gesture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("envelope encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no open connection")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("gesture `none` cannot be bound")]
    UnbindableGesture,
    #[error("{0} is bound to a special action and cannot take a command")]
    SpecialBinding(Gesture),
    #[error("command text is empty")]
    EmptyCommand,
}

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("session actor unavailable")]
    Unavailable,
}
