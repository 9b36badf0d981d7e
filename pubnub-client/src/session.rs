//! Subscribe session: long-poll loop, backoff, and ordered delivery.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};

use crate::client::PubNub;
use crate::codec;
use crate::config::TimingConfig;
use crate::crypto::Cipher;
use crate::protocol::{Batch, Envelope, PRESENCE_SUFFIX, WirePresence};
use crate::subscribe::{Target, poll};
use crate::types::{Cursor, Error, Event, Message, Presence};

pub(crate) struct SessionState {
    pub client: PubNub,
    pub target: Target,
    pub cursor: Cursor,
    pub event_tx: mpsc::Sender<Event>,
    /// Consecutive failed polls.
    pub retry_count: u32,
}

enum Phase {
    Idle,
    Polling,
    Delivering(Batch),
    Backoff(Error),
    Stopped,
}

/// Drive a session until it is closed or fails for good. A `pending` error
/// from a failed handshake starts the session in backoff.
pub(crate) async fn run_session(
    mut s: SessionState,
    pending: Option<Error>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let mut phase = match pending {
        Some(err) => Phase::Backoff(err),
        None => Phase::Idle,
    };

    loop {
        phase = match phase {
            Phase::Idle => Phase::Polling,

            Phase::Polling => {
                tokio::select! {
                    biased;
                    _ = &mut close_rx => {
                        tracing::info!("Close requested, abandoning in-flight poll");
                        Phase::Stopped
                    }
                    result = poll(&s.client, &s.target, s.cursor) => match result {
                        Ok(batch) => Phase::Delivering(batch),
                        Err(e) if is_retriable(&e) => Phase::Backoff(e),
                        Err(e) => {
                            tracing::error!("Subscribe failed: {e}");
                            let _ = send_event(&s.event_tx, Event::Error(e), &mut close_rx).await;
                            Phase::Stopped
                        }
                    }
                }
            }

            Phase::Delivering(batch) => deliver(&mut s, batch, &mut close_rx).await,

            Phase::Backoff(err) => backoff(&mut s, err, &mut close_rx).await,

            Phase::Stopped => {
                tracing::debug!(timetoken = s.cursor.timetoken, "Subscribe session stopped");
                return;
            }
        };
    }
}

/// Deliver a batch in server order, then advance the cursor. Returns
/// `Stopped` without advancing if the session is closed mid-batch.
async fn deliver(
    s: &mut SessionState,
    batch: Batch,
    close_rx: &mut oneshot::Receiver<()>,
) -> Phase {
    if s.retry_count > 0 {
        tracing::info!(attempts = s.retry_count, "Subscribe recovered");
        s.retry_count = 0;
        if !send_event(&s.event_tx, Event::Connected, close_rx).await {
            return Phase::Stopped;
        }
    }

    if batch.messages.is_empty() {
        tracing::trace!(timetoken = batch.cursor.timetoken, "Empty batch");
    } else {
        tracing::debug!(
            count = batch.messages.len(),
            timetoken = batch.cursor.timetoken,
            "Delivering batch"
        );
    }

    // A poll from timetoken 0 only resolves "now"; its messages are not ours.
    let messages = if s.cursor.timetoken == 0 {
        Vec::new()
    } else {
        batch.messages
    };

    let cipher = s.client.cipher();
    for envelope in messages {
        let event = to_event(envelope, cipher.as_deref());
        if !send_event(&s.event_tx, event, close_rx).await {
            return Phase::Stopped;
        }
    }

    s.cursor = Cursor {
        timetoken: batch.cursor.timetoken,
        region: batch.cursor.region.or(s.cursor.region),
    };
    Phase::Idle
}

/// Wait before retrying from the same cursor, or give up after too many
/// consecutive failures.
async fn backoff(
    s: &mut SessionState,
    err: Error,
    close_rx: &mut oneshot::Receiver<()>,
) -> Phase {
    let timing = &s.client.config().timing;
    s.retry_count += 1;

    if s.retry_count > timing.max_retry_attempts {
        tracing::error!(
            attempts = timing.max_retry_attempts,
            "Subscribe giving up: {err}"
        );
        let _ = send_event(&s.event_tx, Event::Error(err), close_rx).await;
        return Phase::Stopped;
    }

    if s.retry_count == 1 {
        let reason = Some(err.to_string());
        if !send_event(&s.event_tx, Event::Disconnected { reason }, close_rx).await {
            return Phase::Stopped;
        }
    }

    let delay = backoff_delay(timing, s.retry_count);
    tracing::warn!(
        attempt = s.retry_count,
        delay_ms = delay.as_millis() as u64,
        timetoken = s.cursor.timetoken,
        "Subscribe poll failed: {err}"
    );

    tokio::select! {
        biased;
        _ = close_rx => {
            tracing::info!("Close requested during backoff");
            Phase::Stopped
        }
        _ = tokio::time::sleep(delay) => Phase::Polling,
    }
}

/// Send an event unless the session is closed first. Returns `false` when
/// the session must stop (closed, or the receiver is gone).
async fn send_event(
    tx: &mpsc::Sender<Event>,
    event: Event,
    close_rx: &mut oneshot::Receiver<()>,
) -> bool {
    tokio::select! {
        biased;
        _ = close_rx => {
            tracing::debug!("Close requested, discarding undelivered events");
            false
        }
        sent = tx.send(event) => sent.is_ok(),
    }
}

/// Exponential backoff with jitter, capped at `max_retry_interval`.
fn backoff_delay(timing: &TimingConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(30);
    let base = timing
        .initial_retry_interval
        .saturating_mul(1u32 << exp)
        .min(timing.max_retry_interval);
    // Jitter source only; not a random number generator.
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let spread = (timing.initial_retry_interval.as_millis() as u64).max(1);
    let jitter = Duration::from_millis(nanos % spread);
    (base + jitter).min(timing.max_retry_interval)
}

/// Network failures, malformed responses, timeouts, throttling and 5xx
/// responses are retried; anything else ends the session.
pub(crate) fn is_retriable(err: &Error) -> bool {
    match err {
        Error::Network(_) | Error::ResponseParsing { .. } => true,
        Error::ServerRejected { status_code, .. } => {
            *status_code >= 500 || *status_code == 408 || *status_code == 429
        }
        _ => false,
    }
}

fn to_event(envelope: Envelope, cipher: Option<&Cipher>) -> Event {
    let timetoken = envelope.timetoken();
    if envelope.is_presence() {
        return presence_event(envelope, timetoken);
    }

    let Envelope {
        channel,
        subscription,
        payload,
        publisher,
        user_metadata,
        message_type,
        ..
    } = envelope;
    let message_type = message_type.unwrap_or(0);
    // Only regular messages are encrypted; signals and other types are not.
    let cipher = if message_type == 0 { cipher } else { None };

    match codec::decode(&payload, cipher) {
        Ok(decoded) => Event::Message(Message {
            subscription: subscription.filter(|b| *b != channel),
            channel,
            payload: decoded,
            publisher,
            timetoken,
            user_metadata,
            message_type,
        }),
        Err(error) => {
            tracing::warn!(channel = %channel, timetoken, "Undecodable message: {error}");
            Event::Undecodable {
                channel,
                raw: payload,
                error,
            }
        }
    }
}

fn presence_event(envelope: Envelope, timetoken: u64) -> Event {
    let channel = strip_presence(&envelope.channel);
    let subscription = envelope
        .subscription
        .as_deref()
        .map(strip_presence)
        .filter(|b| *b != channel);

    match serde_json::from_value::<WirePresence>(envelope.payload.clone()) {
        Ok(p) => Event::Presence(Presence {
            channel,
            subscription,
            action: p.action,
            uuid: p.uuid,
            occupancy: p.occupancy,
            timestamp: p.timestamp,
            state: p.data,
            timetoken,
        }),
        Err(e) => Event::Undecodable {
            error: Error::ResponseParsing {
                message: format!("invalid presence event: {e}"),
                body: envelope.payload.to_string(),
            },
            channel: envelope.channel,
            raw: envelope.payload,
        },
    }
}

fn strip_presence(name: &str) -> String {
    name.strip_suffix(PRESENCE_SUFFIX).unwrap_or(name).to_string()
}
