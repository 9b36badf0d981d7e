//! Encryption/serialization pipeline for message payloads.
//!
//! Outgoing: [`Payload`] → wire text placed in the publish path or body.
//! Incoming: wire JSON value → decrypted, decoded application value.

use serde_json::{Map, Value};

use crate::crypto::Cipher;
use crate::types::{Error, Stage};

/// Object field whose value alone is encrypted in partial mode.
pub const PN_OTHER: &str = "pn_other";

/// An application message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Any JSON value other than an object.
    Scalar(Value),
    /// A JSON object. Eligible for `pn_other` partial encryption.
    Object(Map<String, Value>),
    /// Text the caller already serialized. Sent verbatim, never re-encoded.
    Raw(String),
}

impl Payload {
    pub fn raw(text: impl Into<String>) -> Self {
        Payload::Raw(text.into())
    }

    pub(crate) fn is_null(&self) -> bool {
        matches!(self, Payload::Scalar(Value::Null))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Payload::Object(map),
            other => Payload::Scalar(other),
        }
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Payload::Object(map)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Scalar(Value::String(s.to_string()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Scalar(Value::String(s))
    }
}

/// Per-call encoding options.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EncodeOptions<'a> {
    /// JSON-encode the message. When unset the message must already be text.
    pub serialize: bool,
    pub cipher: Option<&'a Cipher>,
    /// Encrypt only `pn_other` when the message is an object whose `pn_other`
    /// is a string.
    pub partial: bool,
    /// Stage reported in errors (path for GET, body for POST).
    pub stage: Stage,
}

/// Produce the wire text for an outgoing message.
pub(crate) fn encode(payload: &Payload, opts: EncodeOptions<'_>) -> Result<String, Error> {
    let Some(cipher) = opts.cipher else {
        return serialized_text(payload, opts.serialize, opts.stage);
    };

    if opts.partial
        && let Payload::Object(map) = payload
        && let Some(other @ Value::String(_)) = map.get(PN_OTHER)
    {
        let mut map = map.clone();
        let text = serialized_text(&Payload::from(other.clone()), opts.serialize, opts.stage)?;
        map.insert(
            PN_OTHER.to_string(),
            Value::String(cipher.encrypt_string(&text)?),
        );
        return to_json(&Value::Object(map), opts.stage);
    }

    let text = serialized_text(payload, opts.serialize, opts.stage)?;
    to_json(&Value::String(cipher.encrypt_string(&text)?), opts.stage)
}

/// Canonical text of a payload before any encryption.
fn serialized_text(payload: &Payload, serialize: bool, stage: Stage) -> Result<String, Error> {
    match payload {
        Payload::Raw(text) => Ok(text.clone()),
        Payload::Scalar(Value::String(s)) if !serialize => Ok(s.clone()),
        _ if !serialize => Err(Error::Build {
            stage,
            message: "message is not JSON serialized".to_string(),
        }),
        Payload::Scalar(value) => to_json(value, stage),
        Payload::Object(map) => to_json(&Value::Object(map.clone()), stage),
    }
}

fn to_json(value: &Value, stage: Stage) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| Error::Parsing {
        stage,
        message: e.to_string(),
    })
}

/// Decode a payload received on the subscribe path.
///
/// Without a cipher the value passes through. With a cipher the value must
/// be ciphertext: a base64 string, or an object whose `pn_other` field is a
/// base64 string. Anything else is a parsing error.
pub(crate) fn decode(raw: &Value, cipher: Option<&Cipher>) -> Result<Value, Error> {
    let Some(cipher) = cipher else {
        return Ok(raw.clone());
    };
    match raw {
        Value::String(encoded) => decrypt_value(cipher, encoded),
        Value::Object(map) => match map.get(PN_OTHER) {
            Some(Value::String(encoded)) => {
                let mut map = map.clone();
                map.insert(PN_OTHER.to_string(), decrypt_value(cipher, encoded)?);
                Ok(Value::Object(map))
            }
            _ => Err(Error::Parsing {
                stage: Stage::Decrypt,
                message: format!("object without encrypted {PN_OTHER} field"),
            }),
        },
        other => Err(Error::Parsing {
            stage: Stage::Decrypt,
            message: format!("expected ciphertext, got {}", json_kind(other)),
        }),
    }
}

fn decrypt_value(cipher: &Cipher, encoded: &str) -> Result<Value, Error> {
    let text = cipher
        .decrypt_string(encoded)
        .map_err(|e| Error::Parsing {
            stage: Stage::Decrypt,
            message: e.to_string(),
        })?;
    // Publishers with serialization disabled may have encrypted plain text.
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
