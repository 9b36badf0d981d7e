//! Client handle shared by every request builder.

use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::crypto::Cipher;
use crate::protocol::{self, TIME_PATH};
use crate::publish::PublishBuilder;
use crate::sequence::PublishSequence;
use crate::subscribe::SubscribeBuilder;
use crate::transport::{self, Operation, RequestDescriptor};
use crate::types::Error;

/// Message bus client. Cloning is a cheap `Arc` refcount bump; clones share
/// the connection pool, the publish sequence, and the cipher key.
#[derive(Clone)]
pub struct PubNub {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    http: reqwest::Client,
    sequence: PublishSequence,
    cipher: RwLock<Option<Arc<Cipher>>>,
}

impl PubNub {
    pub fn new(config: Config) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timing.connect_timeout)
            .build()?;
        let cipher = config
            .cipher_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| Arc::new(Cipher::new(k)));

        tracing::info!(
            origin = %config.origin,
            uuid = %config.uuid,
            encrypted = cipher.is_some(),
            signed = config.signing_key().is_some(),
            "Client initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                sequence: PublishSequence::new(),
                cipher: RwLock::new(cipher),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn uuid(&self) -> &str {
        &self.inner.config.uuid
    }

    /// Replace (or clear) the cipher key. Requests already in progress keep
    /// the key they started with.
    pub fn set_cipher_key(&self, key: Option<&str>) {
        let cipher = key.filter(|k| !k.is_empty()).map(|k| Arc::new(Cipher::new(k)));
        tracing::info!(encrypted = cipher.is_some(), "Cipher key updated");
        let mut guard = self
            .inner
            .cipher
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = cipher;
    }

    /// Snapshot of the current cipher, taken once per call.
    pub(crate) fn cipher(&self) -> Option<Arc<Cipher>> {
        self.inner
            .cipher
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn next_sequence(&self) -> u32 {
        self.inner.sequence.next()
    }

    /// Start building a publish request.
    pub fn publish(&self) -> PublishBuilder {
        PublishBuilder::new(self.clone())
    }

    /// Publish that is neither stored in history nor replicated to other
    /// regions.
    pub fn fire(&self) -> PublishBuilder {
        self.publish().should_store(false).do_not_replicate(true)
    }

    /// Start building a subscription.
    pub fn subscribe(&self) -> SubscribeBuilder {
        SubscribeBuilder::new(self.clone())
    }

    /// Fetch the current server timetoken.
    pub async fn time(&self) -> Result<u64, Error> {
        let config = self.config();
        let mut desc = RequestDescriptor::get(
            Operation::Time,
            TIME_PATH.to_string(),
            config.timing.non_subscribe_timeout,
        );
        desc.query = transport::default_query(config);
        let raw = transport::send(self.http(), config, desc).await?;
        protocol::parse_time_response(raw.status, &raw.body)
    }
}

impl std::fmt::Debug for PubNub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubNub")
            .field("origin", &self.inner.config.origin)
            .field("uuid", &self.inner.config.uuid)
            .finish_non_exhaustive()
    }
}
