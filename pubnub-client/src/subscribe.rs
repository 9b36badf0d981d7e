//! Public entry point: [`SubscribeBuilder`] and [`Subscription`].

use tokio::sync::{mpsc, oneshot};

use crate::client::PubNub;
use crate::protocol::{self, PRESENCE_SUFFIX, Batch, query};
use crate::session::{SessionState, is_retriable, run_session};
use crate::transport::{self, Operation, RequestDescriptor};
use crate::types::{Cursor, Error, Event, MissingField};

/// Handle to a running subscription.
///
/// Call [`next`](Subscription::next) to receive events, or
/// [`close`](Subscription::close) to stop the session. Dropping the handle
/// also stops it.
pub struct Subscription {
    rx: mpsc::Receiver<Event>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// Receive the next event. Returns `None` once the session has stopped
    /// and every queued event has been received.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Stop the session. No long-poll is started afterwards and any response
    /// still in flight is discarded. Events queued before the call can still
    /// be received.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for a subscription session.
#[derive(Debug, Clone)]
pub struct SubscribeBuilder {
    client: PubNub,
    channels: Vec<String>,
    channel_groups: Vec<String>,
    cursor: Option<Cursor>,
    with_presence: bool,
}

impl SubscribeBuilder {
    pub(crate) fn new(client: PubNub) -> Self {
        Self {
            client,
            channels: Vec::new(),
            channel_groups: Vec::new(),
            cursor: None,
            with_presence: false,
        }
    }

    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn channel_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_groups
            .extend(groups.into_iter().map(Into::into));
        self
    }

    /// Resume from a known cursor instead of "now".
    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Also receive presence events for the subscribed channels and groups.
    pub fn with_presence(mut self, presence: bool) -> Self {
        self.with_presence = presence;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.client.config().subscribe_key.is_empty() {
            return Err(Error::Validation(MissingField::SubscribeKey));
        }
        if self.channels.iter().all(String::is_empty)
            && self.channel_groups.iter().all(String::is_empty)
        {
            return Err(Error::Validation(MissingField::Channel));
        }
        Ok(())
    }

    /// Validate and start the session.
    ///
    /// Without an explicit cursor, the initial "now" handshake runs inline.
    /// A non-retriable handshake failure (for example a 403) is returned here.
    /// A retriable one (network error, 5xx) starts the session in backoff,
    /// reported through [`Event::Disconnected`]. The long-poll loop runs on a
    /// background task and retries recoverable failures on its own.
    pub async fn execute(self) -> Result<Subscription, Error> {
        self.validate()?;

        let mut target = Target {
            channels: non_empty(self.channels),
            channel_groups: non_empty(self.channel_groups),
        };
        if self.with_presence {
            target.add_presence();
        }

        let (cursor, pending) = match self.cursor {
            Some(cursor) => (cursor, None),
            None => match poll(&self.client, &target, Cursor::default()).await {
                Ok(batch) => {
                    tracing::info!(
                        timetoken = batch.cursor.timetoken,
                        "Subscribe handshake complete"
                    );
                    (batch.cursor, None)
                }
                Err(e) if is_retriable(&e) => {
                    tracing::warn!("Subscribe handshake failed, retrying: {e}");
                    (Cursor::default(), Some(e))
                }
                Err(e) => return Err(e),
            },
        };

        let timing = &self.client.config().timing;
        let (event_tx, event_rx) = mpsc::channel::<Event>(timing.event_channel_capacity.max(1));
        let (close_tx, close_rx) = oneshot::channel::<()>();

        if pending.is_none() {
            let _ = event_tx.send(Event::Connected).await;
        }

        tokio::spawn(run_session(
            SessionState {
                client: self.client,
                target,
                cursor,
                event_tx,
                retry_count: 0,
            },
            pending,
            close_rx,
        ));

        Ok(Subscription {
            rx: event_rx,
            close_tx: Some(close_tx),
        })
    }
}

fn non_empty(names: Vec<String>) -> Vec<String> {
    names.into_iter().filter(|n| !n.is_empty()).collect()
}

/// Channels and channel groups a session polls.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub channels: Vec<String>,
    pub channel_groups: Vec<String>,
}

impl Target {
    fn add_presence(&mut self) {
        let presence = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .filter(|n| !n.ends_with(PRESENCE_SUFFIX))
                .map(|n| format!("{n}{PRESENCE_SUFFIX}"))
                .collect()
        };
        let channels = presence(&self.channels);
        let groups = presence(&self.channel_groups);
        self.channels.extend(channels);
        self.channel_groups.extend(groups);
    }
}

/// Issue one long-poll from `cursor`.
pub(crate) async fn poll(client: &PubNub, target: &Target, cursor: Cursor) -> Result<Batch, Error> {
    let config = client.config();
    let mut desc = RequestDescriptor::get(
        Operation::Subscribe,
        protocol::subscribe_path(&config.subscribe_key, &target.channels, cursor.timetoken),
        config.timing.subscribe_timeout,
    );
    desc.query = transport::default_query(config);
    if let Some(region) = cursor.region {
        desc.set_query(query::REGION, region.to_string());
    }
    if !target.channel_groups.is_empty() {
        desc.set_query(query::CHANNEL_GROUP, target.channel_groups.join(","));
    }
    if let Some(heartbeat) = config.presence_timeout {
        desc.set_query(query::HEARTBEAT, heartbeat.to_string());
    }
    let raw = transport::send(client.http(), config, desc).await?;
    protocol::parse_subscribe_response(raw.status, &raw.body)
}
