//! Wire protocol: paths, query parameters, response shapes, and request
//! signing.

use std::collections::BTreeMap;

use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::types::{Cursor, Error};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub(crate) const SDK_NAME: &str = concat!("pubnub-client-rs/", env!("CARGO_PKG_VERSION"));
pub(crate) const PRESENCE_SUFFIX: &str = "-pnpres";

pub mod query {
    pub const UUID: &str = "uuid";
    pub const PNSDK: &str = "pnsdk";
    pub const AUTH: &str = "auth";
    pub const SEQN: &str = "seqn";
    pub const STORE: &str = "store";
    pub const TTL: &str = "ttl";
    pub const NOREP: &str = "norep";
    pub const META: &str = "meta";
    /// Region of the subscribe cursor.
    pub const REGION: &str = "tt";
    pub const CHANNEL_GROUP: &str = "channel-group";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SIGNATURE: &str = "signature";
}

/// Publish acknowledgement text for a stored/forwarded message.
const PUBLISH_SENT: &str = "Sent";

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Percent-encode a path segment or query value. Spaces become `%20`.
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Render a sorted query string. Values are percent-encoded.
pub(crate) fn encode_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{k}={}", encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

pub(crate) fn publish_get_path(pub_key: &str, sub_key: &str, channel: &str, payload: &str) -> String {
    format!(
        "/publish/{}/{}/0/{}/0/{}",
        encode_component(pub_key),
        encode_component(sub_key),
        encode_component(channel),
        encode_component(payload),
    )
}

pub(crate) fn publish_post_path(pub_key: &str, sub_key: &str, channel: &str) -> String {
    format!(
        "/publish/{}/{}/0/{}/0",
        encode_component(pub_key),
        encode_component(sub_key),
        encode_component(channel),
    )
}

/// Channels are comma-joined; `,` stands in when only groups are subscribed.
pub(crate) fn subscribe_path(sub_key: &str, channels: &[String], timetoken: u64) -> String {
    let channels = if channels.is_empty() {
        ",".to_string()
    } else {
        channels
            .iter()
            .map(|c| encode_component(c))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "/subscribe/{}/{channels}/0/{timetoken}",
        encode_component(sub_key)
    )
}

pub(crate) const TIME_PATH: &str = "/time/0";

// ---------------------------------------------------------------------------
// Request signing
// ---------------------------------------------------------------------------

/// HMAC-SHA256 signature over keys, path and sorted query, URL-safe base64.
pub fn sign(
    secret_key: &str,
    sub_key: &str,
    pub_key: &str,
    path: &str,
    query: &BTreeMap<String, String>,
) -> Result<String, Error> {
    let text = format!("{sub_key}\n{pub_key}\n{path}\n{}", encode_query(query));
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes()).map_err(|e| {
        Error::Parsing {
            stage: crate::types::Stage::BuildQuery,
            message: format!("HMAC error: {e}"),
        }
    })?;
    mac.update(text.as_bytes());
    Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Timetokens arrive as strings in subscribe responses and as numbers
/// elsewhere.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireTimetoken {
    Text(String),
    Number(u64),
}

impl WireTimetoken {
    fn value(&self) -> Option<u64> {
        match self {
            WireTimetoken::Text(s) => s.parse().ok(),
            WireTimetoken::Number(n) => Some(*n),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireCursor {
    pub t: WireTimetoken,
    #[serde(default)]
    pub r: Option<u32>,
}

impl WireCursor {
    fn cursor(&self) -> Option<Cursor> {
        Some(Cursor {
            timetoken: self.t.value()?,
            region: self.r,
        })
    }
}

/// One message envelope inside a subscribe batch.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "c")]
    pub channel: String,
    #[serde(rename = "b", default)]
    pub subscription: Option<String>,
    #[serde(rename = "d", default)]
    pub payload: Value,
    #[serde(rename = "i", default)]
    pub publisher: Option<String>,
    #[serde(rename = "p", default)]
    pub(crate) publish_cursor: Option<WireCursor>,
    #[serde(rename = "u", default)]
    pub user_metadata: Option<Value>,
    #[serde(rename = "e", default)]
    pub message_type: Option<i32>,
}

impl Envelope {
    pub fn timetoken(&self) -> u64 {
        self.publish_cursor
            .as_ref()
            .and_then(|c| c.t.value())
            .unwrap_or_default()
    }

    pub fn is_presence(&self) -> bool {
        self.channel.ends_with(PRESENCE_SUFFIX)
    }
}

#[derive(Debug, Deserialize)]
struct WireSubscribeResponse {
    t: WireCursor,
    #[serde(default)]
    m: Vec<Envelope>,
}

/// A decoded subscribe batch: messages in server order plus the next cursor.
#[derive(Debug)]
pub struct Batch {
    pub cursor: Cursor,
    pub messages: Vec<Envelope>,
}

/// Presence event body carried in the `d` field of a `-pnpres` envelope.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WirePresence {
    pub action: String,
    pub uuid: Option<String>,
    pub occupancy: Option<u64>,
    pub timestamp: Option<u64>,
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

fn parsing_error(message: impl Into<String>, body: &str) -> Error {
    Error::ResponseParsing {
        message: message.into(),
        body: body.to_string(),
    }
}

/// Map an error-status body to a server-rejected error, using the `message`
/// field of a JSON object body when present.
fn rejected(status: StatusCode, body: &str) -> Error {
    let message = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        Ok(Value::Array(arr)) => arr.get(1).and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    Error::ServerRejected {
        status_code: status.as_u16(),
        message: message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        }),
    }
}

/// Decode `[status, "Sent" | error-text, "timetoken"]`.
pub fn parse_publish_response(status: StatusCode, body: &str) -> Result<u64, Error> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if !status.is_success() => return Err(rejected(status, body)),
        Err(e) => return Err(parsing_error(format!("invalid JSON: {e}"), body)),
    };
    let Value::Array(items) = value else {
        if !status.is_success() {
            return Err(rejected(status, body));
        }
        return Err(parsing_error("expected a JSON array", body));
    };

    let code = items.first().and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });
    let text = items.get(1).and_then(Value::as_str);
    let (Some(code), Some(text)) = (code, text) else {
        return Err(parsing_error("missing status code or text", body));
    };
    if code != 1 || text != PUBLISH_SENT {
        return Err(Error::ServerRejected {
            status_code: status.as_u16(),
            message: text.to_string(),
        });
    }

    let timestamp = items.get(2).and_then(|v| match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    });
    timestamp.ok_or_else(|| parsing_error("missing or invalid timestamp", body))
}

/// Decode `{"t": {"t": "...", "r": n}, "m": [...]}`.
pub fn parse_subscribe_response(status: StatusCode, body: &str) -> Result<Batch, Error> {
    if !status.is_success() {
        return Err(rejected(status, body));
    }
    let wire: WireSubscribeResponse = serde_json::from_str(body)
        .map_err(|e| parsing_error(format!("invalid subscribe response: {e}"), body))?;
    let cursor = wire
        .t
        .cursor()
        .ok_or_else(|| parsing_error("invalid timetoken", body))?;
    Ok(Batch {
        cursor,
        messages: wire.m,
    })
}

/// Decode `[timetoken]`.
pub fn parse_time_response(status: StatusCode, body: &str) -> Result<u64, Error> {
    if !status.is_success() {
        return Err(rejected(status, body));
    }
    let items: Vec<WireTimetoken> = serde_json::from_str(body)
        .map_err(|e| parsing_error(format!("invalid time response: {e}"), body))?;
    items
        .first()
        .and_then(WireTimetoken::value)
        .ok_or_else(|| parsing_error("missing timetoken", body))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
