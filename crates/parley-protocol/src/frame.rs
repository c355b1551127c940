//! Outbound frames
//!
//! A `Frame` is one encoded transport message. Payloads are serialized as
//! compact JSON, which never contains a raw line break, so a frame always
//! fits in a single line of the transport.

use serde::Serialize;
use serde_json::json;

use crate::envelope::is_valid_verb;
use crate::error::ProtocolError;
use crate::Result;

/// Verb used for failures that have no paired result verb.
pub const COMMAND_ERROR_VERB: &str = "commandError";

/// Error-suffixed verb paired with a result verb (`gotLocales` -> `gotLocalesError`).
pub fn error_verb(result_verb: &str) -> String {
    format!("{result_verb}Error")
}

/// Category reported in `commandError` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Protocol,
    Routing,
    Decode,
    Handler,
    DuplicateStream,
    DuplicateKey,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Routing => "routing",
            ErrorKind::Decode => "decode",
            ErrorKind::Handler => "handler",
            ErrorKind::DuplicateStream => "duplicateStream",
            ErrorKind::DuplicateKey => "duplicateKey",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    /// A frame with no payload
    pub fn bare(verb: &str) -> Result<Self> {
        check_verb(verb)?;
        Ok(Self(verb.to_string()))
    }

    /// Encode `verb` followed by a single serialized payload value
    pub fn with_payload<T: Serialize + ?Sized>(verb: &str, payload: &T) -> Result<Self> {
        check_verb(verb)?;
        let encoded = serde_json::to_string(payload)
            .map_err(|e| ProtocolError::Unserializable(verb.to_string(), e))?;
        Ok(Self(format!("{verb} {encoded}")))
    }

    /// `<verb> {"error":"<message>"}`
    pub fn error(verb: &str, message: impl std::fmt::Display) -> Self {
        Self::from_parts(verb, &json!({ "error": message.to_string() }))
    }

    /// `commandError {"verb":..,"kind":..,"error":..}`
    pub fn command_error(verb: &str, kind: ErrorKind, message: impl std::fmt::Display) -> Self {
        Self::from_parts(
            COMMAND_ERROR_VERB,
            &json!({
                "verb": verb,
                "kind": kind,
                "error": message.to_string(),
            }),
        )
    }

    // `Value` always serializes, so these never fail.
    fn from_parts(verb: &str, payload: &serde_json::Value) -> Self {
        Self(format!("{verb} {payload}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn verb(&self) -> &str {
        self.0.split(' ').next().unwrap_or_default()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Frame> for String {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

fn check_verb(verb: &str) -> Result<()> {
    if is_valid_verb(verb) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidVerb(verb.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandEnvelope;
    use serde_json::Value;

    #[test]
    fn test_encode_bare() {
        let frame = Frame::bare("minimize").unwrap();
        assert_eq!(frame.as_str(), "minimize");
    }

    #[test]
    fn test_encode_payload_has_no_line_breaks() {
        let frame = Frame::with_payload("gotValue", &json!({"value": "two\nlines"})).unwrap();
        assert!(!frame.as_str().contains('\n'));

        let decoded = CommandEnvelope::decode(frame.as_str()).unwrap();
        assert_eq!(decoded.payload(), Some(&json!({"value": "two\nlines"})));
    }

    #[test]
    fn test_encode_rejects_bad_verb() {
        assert!(Frame::bare("two words").is_err());
        assert!(Frame::with_payload("", &1).is_err());
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = Frame::error(&error_verb("gotLocales"), "disk on fire");
        assert_eq!(frame.as_str(), r#"gotLocalesError {"error":"disk on fire"}"#);
        assert_eq!(frame.verb(), "gotLocalesError");
    }

    #[test]
    fn test_command_error_frame_shape() {
        let frame = Frame::command_error("Bogus", ErrorKind::Routing, "unknown command");
        let decoded = CommandEnvelope::decode(frame.as_str()).unwrap();
        assert!(decoded.is(COMMAND_ERROR_VERB));

        let payload = decoded.payload().unwrap();
        assert_eq!(payload["verb"], Value::from("Bogus"));
        assert_eq!(payload["kind"], Value::from("routing"));
        assert_eq!(payload["error"], Value::from("unknown command"));
    }
}
