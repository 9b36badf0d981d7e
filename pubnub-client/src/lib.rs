//! HTTP publish/subscribe client for the PubNub message bus.
//!
//! Messages are published with one-shot HTTP requests and received over a
//! long-poll subscribe loop that resumes from server-issued timetokens.
//!
//! # Features
//! - Publish over GET or POST with TTL, storage, replication and metadata options
//! - Optional AES-256-CBC payload encryption, including `pn_other` partial mode
//! - Per-client publish sequence numbers
//! - HMAC-SHA256 request signing when a secret key is configured
//! - Subscribe to channels, channel groups and presence with automatic
//!   backoff and resume from the last cursor
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), pubnub_client::Error> {
//! use pubnub_client::{Config, Event, PubNub};
//! use serde_json::json;
//!
//! let client = PubNub::new(Config::new("pub-key", "sub-key"))?;
//!
//! let resp = client
//!     .publish()
//!     .channel("chat")
//!     .message(json!({"text": "hello"}))
//!     .execute()
//!     .await?;
//! println!("published at {}", resp.timestamp);
//!
//! let mut sub = client.subscribe().channels(["chat"]).execute().await?;
//! while let Some(event) = sub.next().await {
//!     match event {
//!         Event::Message(msg) => println!("{}: {}", msg.channel, msg.payload),
//!         Event::Error(e) => return Err(e),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod codec;
mod config;
mod crypto;
mod protocol;
mod publish;
mod sequence;
mod session;
mod subscribe;
mod transport;
mod types;

pub use client::PubNub;
pub use codec::{PN_OTHER, Payload};
pub use config::{Config, DEFAULT_ORIGIN, TimingConfig};
pub use crypto::{Cipher, CryptoError};
pub use publish::PublishBuilder;
pub use sequence::{MAX_SEQUENCE, PublishSequence};
pub use subscribe::{SubscribeBuilder, Subscription};
pub use types::{
    Cursor, Error, Event, Message, MissingField, Presence, PublishResponse, Stage,
};
