//! Publish request builder.
//!
//! Setters never fail and have no side effects; validation, encoding and
//! sequence stamping happen once, when the request is executed.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::PubNub;
use crate::codec::{self, EncodeOptions, Payload};
use crate::protocol::{self, query};
use crate::transport::{self, Operation, RequestDescriptor};
use crate::types::{Error, MissingField, PublishResponse, Stage};

/// Message slot of a builder. Encoding failures from
/// [`PublishBuilder::message_from`] are held until execute time.
#[derive(Debug, Clone, Default)]
enum MessageSlot {
    #[default]
    Missing,
    Ready(Payload),
    Unencodable(String),
}

#[derive(Debug, Clone)]
struct PublishOptions {
    channel: String,
    message: MessageSlot,
    meta: Option<Value>,
    ttl: Option<u32>,
    should_store: Option<bool>,
    use_post: bool,
    serialize: bool,
    do_not_replicate: bool,
    http: Option<reqwest::Client>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            channel: String::new(),
            message: MessageSlot::Missing,
            meta: None,
            ttl: None,
            should_store: None,
            use_post: false,
            serialize: true,
            do_not_replicate: false,
            http: None,
        }
    }
}

/// A prepared publish: validated, encoded and stamped with a sequence
/// number. Consumed exactly once by the transport.
#[derive(Debug)]
pub(crate) struct PreparedPublish {
    pub descriptor: RequestDescriptor,
    pub seqn: u32,
}

/// Builder for a single publish call. Each setter consumes the builder and
/// returns the updated value.
#[derive(Debug, Clone)]
pub struct PublishBuilder {
    client: PubNub,
    opts: PublishOptions,
}

impl PublishBuilder {
    pub(crate) fn new(client: PubNub) -> Self {
        Self {
            client,
            opts: PublishOptions::default(),
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.opts.channel = channel.into();
        self
    }

    pub fn message(mut self, message: impl Into<Payload>) -> Self {
        self.opts.message = MessageSlot::Ready(message.into());
        self
    }

    /// Set the message from any serializable value. A value that cannot be
    /// represented as JSON is reported by `execute`.
    pub fn message_from<T: Serialize + ?Sized>(mut self, message: &T) -> Self {
        self.opts.message = match serde_json::to_value(message) {
            Ok(value) => MessageSlot::Ready(Payload::from(value)),
            Err(e) => MessageSlot::Unencodable(e.to_string()),
        };
        self
    }

    /// Metadata sent alongside the message, usable by subscribe filters.
    /// `Value::Null` clears it.
    pub fn meta(mut self, meta: Value) -> Self {
        self.opts.meta = Some(meta).filter(|m| !m.is_null());
        self
    }

    /// Per-message time-to-store in hours. Ignored when zero.
    pub fn ttl(mut self, hours: u32) -> Self {
        self.opts.ttl = Some(hours);
        self
    }

    pub fn should_store(mut self, store: bool) -> Self {
        self.opts.should_store = Some(store);
        self
    }

    /// Send the message in a POST body instead of the URL path.
    pub fn use_post(mut self, post: bool) -> Self {
        self.opts.use_post = post;
        self
    }

    /// JSON-encode the message (default). When disabled the message must
    /// already be JSON text.
    pub fn serialize(mut self, serialize: bool) -> Self {
        self.opts.serialize = serialize;
        self
    }

    pub fn do_not_replicate(mut self, norep: bool) -> Self {
        self.opts.do_not_replicate = norep;
        self
    }

    /// Use a different HTTP client for this call only.
    pub fn transport(mut self, http: reqwest::Client) -> Self {
        self.opts.http = Some(http);
        self
    }

    fn validate(&self) -> Result<&Payload, Error> {
        let config = self.client.config();
        if config.publish_key.is_empty() {
            return Err(Error::Validation(MissingField::PublishKey));
        }
        if config.subscribe_key.is_empty() {
            return Err(Error::Validation(MissingField::SubscribeKey));
        }
        if self.opts.channel.is_empty() {
            return Err(Error::Validation(MissingField::Channel));
        }
        match &self.opts.message {
            MessageSlot::Missing => Err(Error::Validation(MissingField::Message)),
            MessageSlot::Ready(p) if p.is_null() => Err(Error::Validation(MissingField::Message)),
            MessageSlot::Ready(p) => Ok(p),
            MessageSlot::Unencodable(message) => Err(Error::Parsing {
                stage: self.payload_stage(),
                message: message.clone(),
            }),
        }
    }

    fn payload_stage(&self) -> Stage {
        if self.opts.use_post {
            Stage::BuildBody
        } else {
            Stage::BuildPath
        }
    }

    /// Validate, encode, and stamp the next sequence number.
    pub(crate) fn prepare(&self) -> Result<PreparedPublish, Error> {
        let payload = self.validate()?;
        let config = self.client.config();
        let cipher = self.client.cipher();

        let wire = codec::encode(
            payload,
            EncodeOptions {
                serialize: self.opts.serialize,
                cipher: cipher.as_deref(),
                partial: !config.disable_pn_other_processing,
                stage: self.payload_stage(),
            },
        )?;

        let (method, path, body) = if self.opts.use_post {
            let path = protocol::publish_post_path(
                &config.publish_key,
                &config.subscribe_key,
                &self.opts.channel,
            );
            (Method::POST, path, Some(wire))
        } else {
            let path = protocol::publish_get_path(
                &config.publish_key,
                &config.subscribe_key,
                &self.opts.channel,
                &wire,
            );
            (Method::GET, path, None)
        };

        let mut descriptor = RequestDescriptor {
            operation: Operation::Publish,
            method,
            path,
            query: transport::default_query(config),
            body,
            timeout: config.timing.non_subscribe_timeout,
        };
        if let Some(meta) = &self.opts.meta {
            let meta = serde_json::to_string(meta).map_err(|e| Error::Parsing {
                stage: Stage::BuildQuery,
                message: e.to_string(),
            })?;
            descriptor.set_query(query::META, meta);
        }
        if let Some(store) = self.opts.should_store {
            descriptor.set_query(query::STORE, if store { "1" } else { "0" });
        }
        if let Some(ttl) = self.opts.ttl.filter(|t| *t > 0) {
            descriptor.set_query(query::TTL, ttl.to_string());
        }
        if self.opts.do_not_replicate {
            descriptor.set_query(query::NOREP, "true");
        }

        let seqn = self.client.next_sequence();
        tracing::trace!(seqn, channel = %self.opts.channel, "Stamped publish sequence");
        descriptor.set_query(query::SEQN, seqn.to_string());

        Ok(PreparedPublish { descriptor, seqn })
    }

    /// Validate, encode and send the publish.
    pub async fn execute(self) -> Result<PublishResponse, Error> {
        let prepared = self.prepare()?;
        let http = self.opts.http.as_ref().unwrap_or(self.client.http());
        let raw = transport::send(http, self.client.config(), prepared.descriptor).await?;
        finish(raw, prepared.seqn)
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`Error::Cancelled`] once `token` is cancelled.
    pub async fn execute_with_cancellation(
        self,
        token: CancellationToken,
    ) -> Result<PublishResponse, Error> {
        let prepared = self.prepare()?;
        let http = self.opts.http.as_ref().unwrap_or(self.client.http());
        let raw =
            transport::send_cancellable(http, self.client.config(), prepared.descriptor, &token)
                .await?;
        finish(raw, prepared.seqn)
    }
}

fn finish(raw: transport::RawResponse, seqn: u32) -> Result<PublishResponse, Error> {
    match protocol::parse_publish_response(raw.status, &raw.body) {
        Ok(timestamp) => Ok(PublishResponse { timestamp, seqn }),
        Err(e) => {
            tracing::warn!(seqn, status = %raw.status, "Publish failed: {e}");
            Err(e)
        }
    }
}
