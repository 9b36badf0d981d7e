//! Public types for the pubnub-client crate.

use std::fmt;

use crate::crypto::CryptoError;

/// Resumption point of a subscription: a server-issued timetoken plus the
/// region that issued it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Server timetoken (10ns ticks since the Unix epoch). `0` asks the
    /// server for "now".
    pub timetoken: u64,
    /// Region identifier returned alongside the timetoken.
    pub region: Option<u32>,
}

impl Cursor {
    pub fn new(timetoken: u64) -> Self {
        Self {
            timetoken,
            region: None,
        }
    }
}

/// Successful publish result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishResponse {
    /// Server timestamp (timetoken) assigned to the published message.
    pub timestamp: u64,
    /// Local sequence number stamped on the request.
    pub seqn: u32,
}

/// A message received on a subscribed channel.
#[derive(Debug, Clone)]
pub struct Message {
    /// Channel the message was published to.
    pub channel: String,
    /// Subscription that matched the channel (channel group or wildcard),
    /// when different from `channel`.
    pub subscription: Option<String>,
    /// Decoded (and decrypted) payload.
    pub payload: serde_json::Value,
    /// Publisher's client UUID.
    pub publisher: Option<String>,
    /// Publish timetoken.
    pub timetoken: u64,
    /// Metadata attached by the publisher.
    pub user_metadata: Option<serde_json::Value>,
    /// Server message type (0 for regular messages, 1 for signals).
    pub message_type: i32,
}

/// A presence event received on a `-pnpres` channel.
#[derive(Debug, Clone)]
pub struct Presence {
    /// Channel the presence event refers to (without the `-pnpres` suffix).
    pub channel: String,
    pub subscription: Option<String>,
    /// Presence action, e.g. `join`, `leave`, `timeout`, `state-change`.
    pub action: String,
    pub uuid: Option<String>,
    pub occupancy: Option<u64>,
    pub timestamp: Option<u64>,
    pub state: Option<serde_json::Value>,
    pub timetoken: u64,
}

/// Events emitted by a [`Subscription`](crate::Subscription).
#[derive(Debug)]
pub enum Event {
    /// The subscription is established (or re-established after backoff).
    Connected,
    /// A message was received on a subscribed channel.
    Message(Message),
    /// A presence event was received.
    Presence(Presence),
    /// A message arrived that could not be decrypted or decoded. The raw
    /// payload is preserved; the session keeps running.
    Undecodable {
        channel: String,
        raw: serde_json::Value,
        error: Error,
    },
    /// A poll failed; the session is backing off and will retry from the
    /// same cursor.
    Disconnected { reason: Option<String> },
    /// An unrecoverable error occurred. No further events follow.
    Error(Error),
}

/// A required field that was absent at execute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    PublishKey,
    SubscribeKey,
    Channel,
    Message,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingField::PublishKey => "publish key",
            MissingField::SubscribeKey => "subscribe key",
            MissingField::Channel => "channel",
            MissingField::Message => "message",
        })
    }
}

/// Pipeline stage in which a local build or encoding step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildPath,
    BuildBody,
    BuildQuery,
    Decrypt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::BuildPath => "build path",
            Stage::BuildBody => "build body",
            Stage::BuildQuery => "build query",
            Stage::Decrypt => "decrypt",
        })
    }
}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: missing {0}")]
    Validation(MissingField),

    #[error("{stage}: {message}")]
    Build { stage: Stage, message: String },

    #[error("{stage}: {message}")]
    Parsing { stage: Stage, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("response parsing error: {message}")]
    ResponseParsing { message: String, body: String },

    #[error("server rejected request: status={status_code}, {message}")]
    ServerRejected { status_code: u16, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("cipher error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}
