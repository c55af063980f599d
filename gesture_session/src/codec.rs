use crate::error::CodecError;
use gesture_protocol::{ClientCommand, Envelope};
use serde_json::{Map, Value};

pub fn decode(raw: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(raw).map_err(CodecError::Decode)
}

/// Serialize an envelope; a missing payload goes out as `{}`.
pub fn encode(kind: &str, payload: Option<Map<String, Value>>) -> Result<String, CodecError> {
    serde_json::to_string(&Envelope::new(kind, payload)).map_err(CodecError::Encode)
}

pub fn encode_command(cmd: &ClientCommand) -> Result<String, CodecError> {
    serde_json::to_string(cmd).map_err(CodecError::Encode)
}
