//! Inbound command envelopes
//!
//! An envelope is the parsed `(verb, payload)` pair handed to the router.
//! Verbs are compared case-insensitively; the original casing is kept for
//! replies and logging.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    verb: String,
    payload: Option<Value>,
}

impl CommandEnvelope {
    pub fn new(verb: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            verb: verb.into(),
            payload,
        }
    }

    /// Decode a raw transport message into an envelope.
    ///
    /// The frame must be a verb token optionally followed by whitespace and
    /// exactly one JSON value. Trailing line terminators are ignored.
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim_end_matches(['\r', '\n']).trim_start();
        if raw.trim().is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let (verb, rest) = match raw.find(char::is_whitespace) {
            Some(pos) => (&raw[..pos], raw[pos..].trim()),
            None => (raw, ""),
        };

        if !is_valid_verb(verb) {
            return Err(ProtocolError::InvalidVerb(verb.to_string()));
        }

        let payload = if rest.is_empty() {
            None
        } else {
            let value = serde_json::from_str::<Value>(rest).map_err(|source| {
                ProtocolError::MalformedPayload {
                    verb: verb.to_string(),
                    source,
                }
            })?;
            Some(value)
        };

        Ok(Self::new(verb, payload))
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Value> {
        self.payload
    }

    /// Case-insensitive verb comparison
    pub fn is(&self, verb: &str) -> bool {
        self.verb.eq_ignore_ascii_case(verb)
    }

    /// If the verb starts with the dot-terminated `prefix` (ignoring case),
    /// return the remainder after it.
    pub fn strip_namespace(&self, prefix: &str) -> Option<&str> {
        strip_namespace(&self.verb, prefix)
    }

    /// Rebuild the envelope under a different verb, keeping the payload.
    pub fn with_verb(self, verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            payload: self.payload,
        }
    }
}

/// Strip a dot-terminated namespace prefix from `verb`, ignoring ASCII case.
pub(crate) fn strip_namespace<'a>(verb: &'a str, prefix: &str) -> Option<&'a str> {
    if !prefix.ends_with('.') || verb.len() < prefix.len() {
        return None;
    }
    let head = verb.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        verb.get(prefix.len()..)
    } else {
        None
    }
}

pub(crate) fn is_valid_verb(verb: &str) -> bool {
    !verb.is_empty()
        && verb
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
