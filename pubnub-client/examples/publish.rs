//! Publish a JSON message to a channel.
//!
//! ```sh
//! PUBNUB_PUBLISH_KEY=pub-c-... PUBNUB_SUBSCRIBE_KEY=sub-c-... \
//!     cargo run -p pubnub-client --example publish -- <CHANNEL> '<JSON>'
//! ```
//!
//! Set `PUBNUB_CIPHER_KEY` to encrypt the message. A message that is not
//! valid JSON is sent as a string.

use pubnub_client::{Config, PubNub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(channel), Some(text)) = (args.first(), args.get(1)) else {
        return Err("usage: publish <CHANNEL> <JSON>".into());
    };
    let publish_key =
        std::env::var("PUBNUB_PUBLISH_KEY").map_err(|_| "PUBNUB_PUBLISH_KEY is not set")?;
    let subscribe_key =
        std::env::var("PUBNUB_SUBSCRIBE_KEY").map_err(|_| "PUBNUB_SUBSCRIBE_KEY is not set")?;

    let mut config = Config::new(publish_key, subscribe_key);
    if let Ok(key) = std::env::var("PUBNUB_CIPHER_KEY") {
        config = config.cipher_key(key);
    }
    let client = PubNub::new(config)?;

    let message = serde_json::from_str::<serde_json::Value>(text)
        .unwrap_or_else(|_| serde_json::Value::String(text.clone()));
    let resp = client
        .publish()
        .channel(channel.as_str())
        .message(message)
        .execute()
        .await?;

    println!("published timetoken={} seqn={}", resp.timestamp, resp.seqn);
    Ok(())
}
