//! Subscribe to one or more channels and print every event.
//!
//! ```sh
//! PUBNUB_SUBSCRIBE_KEY=sub-c-... cargo run -p pubnub-client --example subscribe -- <CHANNEL>...
//! ```
//!
//! Set `PUBNUB_CIPHER_KEY` to decrypt encrypted messages and
//! `PUBNUB_PRESENCE=1` to also receive presence events.
//! Message payloads are printed to stdout (pipe to `jq` for formatting).

use pubnub_client::{Config, Event, PubNub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let channels: Vec<String> = std::env::args().skip(1).collect();
    if channels.is_empty() {
        return Err("usage: subscribe <CHANNEL>...".into());
    }
    let subscribe_key =
        std::env::var("PUBNUB_SUBSCRIBE_KEY").map_err(|_| "PUBNUB_SUBSCRIBE_KEY is not set")?;

    let mut config = Config::new("", subscribe_key);
    if let Ok(key) = std::env::var("PUBNUB_CIPHER_KEY") {
        config = config.cipher_key(key);
    }
    let presence = std::env::var("PUBNUB_PRESENCE").is_ok_and(|v| v == "1");

    let client = PubNub::new(config)?;
    eprintln!("subscribing to {channels:?} ...");
    let mut sub = client
        .subscribe()
        .channels(channels)
        .with_presence(presence)
        .execute()
        .await?;

    while let Some(event) = sub.next().await {
        match event {
            Event::Message(msg) => {
                eprintln!(
                    "[message] channel={} publisher={} tt={}",
                    msg.channel,
                    msg.publisher.as_deref().unwrap_or("-"),
                    msg.timetoken,
                );
                println!("{}", msg.payload);
            }
            Event::Presence(p) => {
                eprintln!(
                    "[presence] channel={} action={} uuid={} occupancy={}",
                    p.channel,
                    p.action,
                    p.uuid.as_deref().unwrap_or("-"),
                    p.occupancy.map_or_else(|| "-".to_string(), |o| o.to_string()),
                );
            }
            Event::Undecodable { channel, error, .. } => {
                eprintln!("[undecodable] channel={channel} {error}");
            }
            Event::Connected => eprintln!("[connected]"),
            Event::Disconnected { reason } => {
                eprintln!("[disconnected] {}", reason.as_deref().unwrap_or("-"));
            }
            Event::Error(e) => {
                eprintln!("[error] {e}");
                break;
            }
        }
    }

    Ok(())
}
