//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_ORIGIN: &str = "ps.pndsn.com";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_NON_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(310);
const INITIAL_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(15);
const MAX_RETRY_ATTEMPTS: u32 = 40;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timeouts and retry policy.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// TCP/TLS connect timeout for every request.
    pub connect_timeout: Duration,
    /// Response timeout for publish, time and other short requests.
    pub non_subscribe_timeout: Duration,
    /// Response timeout for subscribe long-polls. Must exceed the server's
    /// long-poll hold time.
    pub subscribe_timeout: Duration,
    /// First backoff delay after a failed subscribe poll.
    pub initial_retry_interval: Duration,
    /// Upper bound on the backoff delay.
    pub max_retry_interval: Duration,
    /// Consecutive failed polls tolerated before the session gives up.
    pub max_retry_attempts: u32,
    /// Capacity of the per-subscription event queue.
    pub event_channel_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            non_subscribe_timeout: DEFAULT_NON_SUBSCRIBE_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            initial_retry_interval: INITIAL_RETRY_INTERVAL,
            max_retry_interval: MAX_RETRY_INTERVAL,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Client-wide configuration. Immutable once handed to
/// [`PubNub::new`](crate::PubNub::new); the cipher key can be rotated at
/// runtime through [`PubNub::set_cipher_key`](crate::PubNub::set_cipher_key).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub publish_key: String,
    pub subscribe_key: String,
    /// Enables request signing.
    pub secret_key: Option<String>,
    /// Enables payload encryption.
    pub cipher_key: Option<String>,
    /// Sent as `auth` on every request.
    pub auth_key: Option<String>,
    /// Client identifier sent as `uuid` on every request.
    pub uuid: String,
    /// Host (and optional port) of the message bus.
    pub origin: String,
    /// Use `https` instead of `http`.
    pub secure: bool,
    /// When set, encrypted publishes always encrypt the whole message, even
    /// if it is an object carrying a `pn_other` field.
    pub disable_pn_other_processing: bool,
    /// Presence timeout in seconds, sent as `heartbeat` on subscribe.
    pub presence_timeout: Option<u32>,
    #[serde(skip)]
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publish_key: String::new(),
            subscribe_key: String::new(),
            secret_key: None,
            cipher_key: None,
            auth_key: None,
            uuid: format!("pn-{}", uuid::Uuid::new_v4()),
            origin: DEFAULT_ORIGIN.to_string(),
            secure: true,
            disable_pn_other_processing: false,
            presence_timeout: None,
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    pub fn new(publish_key: impl Into<String>, subscribe_key: impl Into<String>) -> Self {
        Self {
            publish_key: publish_key.into(),
            subscribe_key: subscribe_key.into(),
            ..Default::default()
        }
    }

    pub fn secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    pub fn cipher_key(mut self, key: impl Into<String>) -> Self {
        self.cipher_key = Some(key.into());
        self
    }

    pub fn auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn disable_pn_other_processing(mut self, disable: bool) -> Self {
        self.disable_pn_other_processing = disable;
        self
    }

    pub fn presence_timeout(mut self, seconds: u32) -> Self {
        self.presence_timeout = Some(seconds);
        self
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Base URL (scheme + origin) all request paths are appended to.
    pub(crate) fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.origin)
    }

    /// Secret key, treating an empty string as unset.
    pub(crate) fn signing_key(&self) -> Option<&str> {
        self.secret_key.as_deref().filter(|k| !k.is_empty())
    }
}
