use std::time::Duration;

use httpmock::prelude::*;
use pubnub_client::{
    Cipher, Config, Error, Event, MissingField, PubNub, Subscription, TimingConfig,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SUB_KEY: &str = "sub-key";
const PUB_KEY: &str = "pub-key";

fn fast_timing() -> TimingConfig {
    TimingConfig {
        connect_timeout: Duration::from_secs(2),
        non_subscribe_timeout: Duration::from_secs(5),
        subscribe_timeout: Duration::from_secs(30),
        initial_retry_interval: Duration::from_millis(20),
        max_retry_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

fn test_config(server: &MockServer) -> Config {
    Config::new(PUB_KEY, SUB_KEY)
        .uuid("test-client")
        .origin(format!("127.0.0.1:{}", server.port()))
        .secure(false)
        .timing(fast_timing())
}

fn test_client(server: &MockServer) -> PubNub {
    PubNub::new(test_config(server)).unwrap()
}

fn subscribe_path(timetoken: u64) -> String {
    format!("/subscribe/{SUB_KEY}/ch/0/{timetoken}")
}

fn cursor_body(timetoken: u64, messages: serde_json::Value) -> String {
    json!({"t": {"t": timetoken.to_string(), "r": 1}, "m": messages}).to_string()
}

fn envelope(channel: &str, timetoken: u64, payload: serde_json::Value) -> serde_json::Value {
    json!({
        "a": "1", "f": 0, "i": "publisher-1", "k": SUB_KEY,
        "c": channel, "p": {"t": timetoken.to_string(), "r": 1}, "d": payload
    })
}

/// Handshake from "now" that lands on cursor 100.
fn mock_handshake(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(0));
        then.status(200).body(cursor_body(100, json!([])));
    });
}

/// A long-poll that never completes within a test.
fn mock_idle_poll(server: &MockServer, timetoken: u64) {
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(timetoken));
        then.status(200)
            .delay(Duration::from_secs(20))
            .body(cursor_body(timetoken, json!([])));
    });
}

async fn next_event(sub: &mut Subscription) -> Event {
    tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("timed out waiting for event")
        .expect("subscription ended")
}

// ---------------------------------------------------------------------------
// Test 1: GET publish with sequence number
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_get_returns_timestamp_and_seqn() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/publish/pub-key/sub-key/0/ch/0/")
            .query_param("seqn", "1")
            .query_param("uuid", "test-client")
            .query_param_exists("pnsdk");
        then.status(200).body(r#"[1,"Sent","15000000000000001"]"#);
    });

    let client = test_client(&server);
    let resp = client
        .publish()
        .channel("ch")
        .message(json!({"text": "hi"}))
        .execute()
        .await
        .unwrap();

    assert_eq!(resp.timestamp, 15_000_000_000_000_001);
    assert_eq!(resp.seqn, 1);
    mock.assert();
}

// ---------------------------------------------------------------------------
// Test 2: consecutive publishes get consecutive sequence numbers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_publishes_increment_seqn() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_contains("/publish/");
        then.status(200).body(r#"[1,"Sent","42"]"#);
    });

    let client = test_client(&server);
    let first = client.publish().channel("ch").message("a").execute().await.unwrap();
    let second = client.fire().channel("ch").message("b").execute().await.unwrap();
    assert_eq!(first.seqn, 1);
    assert_eq!(second.seqn, 2);
}

// ---------------------------------------------------------------------------
// Test 3: POST publish with partial encryption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn post_publish_encrypts_only_pn_other() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/publish/pub-key/sub-key/0/ch/0")
            .body_contains(r#""route":"A""#)
            .body_contains(r#""pn_other":""#);
        then.status(200).body(r#"[1,"Sent","77"]"#);
    });

    let client = PubNub::new(test_config(&server).cipher_key("enigma")).unwrap();
    let resp = client
        .publish()
        .channel("ch")
        .message(json!({"route": "A", "pn_other": "card-1234"}))
        .use_post(true)
        .execute()
        .await
        .unwrap();

    assert_eq!(resp.timestamp, 77);
    mock.assert();
}

// ---------------------------------------------------------------------------
// Test 4: publish options land in the query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_options_are_sent_as_query() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/publish/")
            .query_param("store", "0")
            .query_param("ttl", "24")
            .query_param("norep", "true")
            .query_param("meta", r#"{"k":"v"}"#)
            .query_param("auth", "token-1");
        then.status(200).body(r#"[1,"Sent","1"]"#);
    });

    let client = PubNub::new(test_config(&server).auth_key("token-1")).unwrap();
    client
        .publish()
        .channel("ch")
        .message(json!(1))
        .meta(json!({"k": "v"}))
        .ttl(24)
        .should_store(false)
        .do_not_replicate(true)
        .execute()
        .await
        .unwrap();
    mock.assert();
}

// ---------------------------------------------------------------------------
// Test 5: server rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_rejection_carries_server_text() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_contains("/publish/");
        then.status(400)
            .body(r#"[0,"Invalid Message","15000000000000001"]"#);
    });

    let client = test_client(&server);
    let err = client
        .publish()
        .channel("ch")
        .message("x")
        .execute()
        .await
        .unwrap_err();
    match err {
        Error::ServerRejected {
            status_code,
            message,
        } => {
            assert_eq!(status_code, 400);
            assert!(message.contains("Invalid Message"));
        }
        other => panic!("expected ServerRejected, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 6: validation failures never reach the network
// ---------------------------------------------------------------------------

#[tokio::test]
async fn null_message_fails_validation_without_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.path_contains("/publish/");
        then.status(200).body(r#"[1,"Sent","1"]"#);
    });

    let client = test_client(&server);
    let err = client
        .publish()
        .channel("ch")
        .message(serde_json::Value::Null)
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(MissingField::Message)));

    let err = client.publish().message("x").execute().await.unwrap_err();
    assert!(matches!(err, Error::Validation(MissingField::Channel)));

    assert_eq!(mock.hits(), 0);
}

// ---------------------------------------------------------------------------
// Test 7: cancellation of an in-flight publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_cancellation_returns_cancelled() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path_contains("/publish/");
        then.status(200)
            .delay(Duration::from_secs(10))
            .body(r#"[1,"Sent","1"]"#);
    });

    let client = test_client(&server);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client
            .publish()
            .channel("ch")
            .message("slow")
            .execute_with_cancellation(token),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

// ---------------------------------------------------------------------------
// Test 8: signed requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn secret_key_signs_requests() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/time/0")
            .query_param_exists("signature")
            .query_param_exists("timestamp");
        then.status(200).body("[15000000000000000]");
    });

    let client = PubNub::new(test_config(&server).secret_key("sec")).unwrap();
    assert_eq!(client.time().await.unwrap(), 15_000_000_000_000_000);
    mock.assert();
}

// ---------------------------------------------------------------------------
// Test 9: subscribe handshake then ordered delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_delivers_batch_in_order() {
    let server = MockServer::start();
    mock_handshake(&server);
    let batch = server.mock(|when, then| {
        when.method(GET)
            .path(subscribe_path(100))
            .query_param("tt", "1")
            .query_param("uuid", "test-client");
        then.status(200).body(cursor_body(
            200,
            json!([
                envelope("ch", 150, json!({"n": 1})),
                envelope("ch", 151, json!({"n": 2})),
                envelope("ch", 152, json!("three")),
            ]),
        ));
    });
    mock_idle_poll(&server, 200);

    let client = test_client(&server);
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    let mut payloads = Vec::new();
    for _ in 0..3 {
        match next_event(&mut sub).await {
            Event::Message(msg) => {
                assert_eq!(msg.channel, "ch");
                assert_eq!(msg.publisher.as_deref(), Some("publisher-1"));
                payloads.push((msg.timetoken, msg.payload));
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }
    assert_eq!(
        payloads,
        vec![
            (150, json!({"n": 1})),
            (151, json!({"n": 2})),
            (152, json!("three")),
        ]
    );
    batch.assert();
}

// ---------------------------------------------------------------------------
// Test 10: explicit cursor skips the handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explicit_cursor_resumes_without_handshake() {
    let server = MockServer::start();
    let handshake = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(0));
        then.status(200).body(cursor_body(100, json!([])));
    });
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(500));
        then.status(200)
            .body(cursor_body(600, json!([envelope("ch", 550, json!("resumed"))])));
    });
    mock_idle_poll(&server, 600);

    let client = test_client(&server);
    let mut sub = client
        .subscribe()
        .channels(["ch"])
        .cursor(pubnub_client::Cursor::new(500))
        .execute()
        .await
        .unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    match next_event(&mut sub).await {
        Event::Message(msg) => assert_eq!(msg.payload, json!("resumed")),
        other => panic!("expected Message, got {other:?}"),
    }
    assert_eq!(handshake.hits(), 0);
}

// ---------------------------------------------------------------------------
// Test 11: transient failure retried from the same cursor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_is_retried_from_same_cursor() {
    let server = MockServer::start();
    mock_handshake(&server);
    let mut failing = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(500).body("Internal Server Error");
    });

    let client = test_client(&server);
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();
    assert!(matches!(next_event(&mut sub).await, Event::Connected));

    match next_event(&mut sub).await {
        Event::Disconnected { reason } => assert!(reason.unwrap().contains("500")),
        other => panic!("expected Disconnected, got {other:?}"),
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while failing.hits() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Add the recovery mock before removing the failing one so no poll
    // falls through to an unmatched 404.
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(200)
            .body(cursor_body(200, json!([envelope("ch", 150, json!("after retry"))])));
    });
    mock_idle_poll(&server, 200);
    failing.delete();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    match next_event(&mut sub).await {
        Event::Message(msg) => assert_eq!(msg.payload, json!("after retry")),
        other => panic!("expected Message, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 12: retries are bounded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retries_give_up_after_max_attempts() {
    let server = MockServer::start();
    mock_handshake(&server);
    let failing = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(503).body("Service Unavailable");
    });

    let timing = TimingConfig {
        max_retry_attempts: 2,
        ..fast_timing()
    };
    let client = PubNub::new(test_config(&server).timing(timing)).unwrap();
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    assert!(matches!(
        next_event(&mut sub).await,
        Event::Disconnected { .. }
    ));
    match next_event(&mut sub).await {
        Event::Error(Error::ServerRejected { status_code, .. }) => assert_eq!(status_code, 503),
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(sub.next().await.is_none());
    assert_eq!(failing.hits(), 3);
}

// ---------------------------------------------------------------------------
// Test 13: non-retriable rejection ends the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forbidden_ends_session_with_error() {
    let server = MockServer::start();
    mock_handshake(&server);
    let forbidden = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(403)
            .body(r#"{"status":403,"error":true,"message":"Forbidden","service":"Access Manager"}"#);
    });

    let client = test_client(&server);
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    match next_event(&mut sub).await {
        Event::Error(Error::ServerRejected {
            status_code,
            message,
        }) => {
            assert_eq!(status_code, 403);
            assert_eq!(message, "Forbidden");
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(sub.next().await.is_none());
    assert_eq!(forbidden.hits(), 1);
}

// ---------------------------------------------------------------------------
// Test 14: non-retriable handshake failure is returned to the caller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_failure_returns_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(0));
        then.status(403).body(r#"{"message":"Forbidden"}"#);
    });

    let client = test_client(&server);
    let result = client.subscribe().channels(["ch"]).execute().await;
    match result {
        Err(Error::ServerRejected { status_code, .. }) => assert_eq!(status_code, 403),
        Err(other) => panic!("expected ServerRejected, got {other:?}"),
        Ok(_) => panic!("expected error, got Ok"),
    }
}

// ---------------------------------------------------------------------------
// Test 15: close discards the in-flight poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_discards_in_flight_response() {
    let server = MockServer::start();
    mock_handshake(&server);
    let in_flight = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(200)
            .delay(Duration::from_millis(300))
            .body(cursor_body(200, json!([envelope("ch", 150, json!("late"))])));
    });
    let after = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(200));
        then.status(200).body(cursor_body(300, json!([])));
    });

    let client = test_client(&server);
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();
    assert!(matches!(next_event(&mut sub).await, Event::Connected));

    tokio::time::timeout(Duration::from_secs(5), async {
        while in_flight.hits() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    sub.close();

    let rest = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap();
    assert!(rest.is_none(), "expected no events after close, got {rest:?}");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(after.hits(), 0);
}

// ---------------------------------------------------------------------------
// Test 16: encrypted messages are decrypted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn encrypted_messages_are_decrypted() {
    let cipher = Cipher::new("enigma");
    let full = cipher.encrypt_string(r#"{"text":"secret"}"#).unwrap();
    let partial = cipher.encrypt_string(r#"{"card":"1234"}"#).unwrap();

    let server = MockServer::start();
    mock_handshake(&server);
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(200).body(cursor_body(
            200,
            json!([
                envelope("ch", 150, json!(full)),
                envelope("ch", 151, json!({"route": "A", "pn_other": partial})),
                envelope("ch", 152, json!({"plain": true})),
            ]),
        ));
    });
    mock_idle_poll(&server, 200);

    let client = PubNub::new(test_config(&server).cipher_key("enigma")).unwrap();
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();
    assert!(matches!(next_event(&mut sub).await, Event::Connected));

    match next_event(&mut sub).await {
        Event::Message(msg) => assert_eq!(msg.payload, json!({"text": "secret"})),
        other => panic!("expected Message, got {other:?}"),
    }
    match next_event(&mut sub).await {
        Event::Message(msg) => assert_eq!(
            msg.payload,
            json!({"route": "A", "pn_other": {"card": "1234"}})
        ),
        other => panic!("expected Message, got {other:?}"),
    }
    match next_event(&mut sub).await {
        Event::Undecodable { channel, raw, .. } => {
            assert_eq!(channel, "ch");
            assert_eq!(raw, json!({"plain": true}));
        }
        other => panic!("expected Undecodable, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 17: presence events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_events_are_delivered() {
    let server = MockServer::start();
    let handshake = server.mock(|when, then| {
        when.method(GET)
            .path(format!("/subscribe/{SUB_KEY}/ch,ch-pnpres/0/0"))
            .query_param("heartbeat", "60");
        then.status(200).body(cursor_body(100, json!([])));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/subscribe/{SUB_KEY}/ch,ch-pnpres/0/100"));
        then.status(200).body(cursor_body(
            200,
            json!([envelope(
                "ch-pnpres",
                150,
                json!({"action": "join", "uuid": "u1", "occupancy": 2, "timestamp": 1700000000})
            )]),
        ));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/subscribe/{SUB_KEY}/ch,ch-pnpres/0/200"));
        then.status(200)
            .delay(Duration::from_secs(20))
            .body(cursor_body(200, json!([])));
    });

    let client = PubNub::new(test_config(&server).presence_timeout(60)).unwrap();
    let mut sub = client
        .subscribe()
        .channels(["ch"])
        .with_presence(true)
        .execute()
        .await
        .unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    match next_event(&mut sub).await {
        Event::Presence(p) => {
            assert_eq!(p.channel, "ch");
            assert_eq!(p.action, "join");
            assert_eq!(p.uuid.as_deref(), Some("u1"));
            assert_eq!(p.occupancy, Some(2));
            assert_eq!(p.timetoken, 150);
        }
        other => panic!("expected Presence, got {other:?}"),
    }
    handshake.assert();
}

// ---------------------------------------------------------------------------
// Test 18: channel-group-only subscription
// ---------------------------------------------------------------------------

#[tokio::test]
async fn channel_group_subscription_uses_placeholder_path() {
    let server = MockServer::start();
    let handshake = server.mock(|when, then| {
        when.method(GET)
            .path_contains(format!("/subscribe/{SUB_KEY}/"))
            .path_contains("/0/0")
            .query_param("channel-group", "g1");
        then.status(200).body(cursor_body(100, json!([])));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path_contains("/0/100")
            .query_param("channel-group", "g1");
        then.status(200)
            .delay(Duration::from_secs(20))
            .body(cursor_body(100, json!([])));
    });

    let client = test_client(&server);
    let mut sub = client
        .subscribe()
        .channel_groups(["g1"])
        .execute()
        .await
        .unwrap();
    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    handshake.assert();
}

// ---------------------------------------------------------------------------
// Test 19: server time
// ---------------------------------------------------------------------------

#[tokio::test]
async fn time_returns_server_timetoken() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/time/0").query_param("uuid", "test-client");
        then.status(200).body("[17000000000000000]");
    });

    let client = test_client(&server);
    assert_eq!(client.time().await.unwrap(), 17_000_000_000_000_000);
}

// ---------------------------------------------------------------------------
// Test 20: retriable handshake failure is retried in the background
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_server_error_retries_in_background() {
    let server = MockServer::start();
    let mut failing = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(0));
        then.status(503).body("Service Unavailable");
    });

    let client = test_client(&server);
    let mut sub = client.subscribe().channels(["ch"]).execute().await.unwrap();

    match next_event(&mut sub).await {
        Event::Disconnected { reason } => assert!(reason.unwrap().contains("503")),
        other => panic!("expected Disconnected, got {other:?}"),
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while failing.hits() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Every recovery mock exists before the failing one is removed, so no
    // poll falls through to an unmatched 404.
    server.mock(|when, then| {
        when.method(GET).path(subscribe_path(100));
        then.status(200)
            .body(cursor_body(200, json!([envelope("ch", 150, json!("first"))])));
    });
    mock_idle_poll(&server, 200);
    mock_handshake(&server);
    failing.delete();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    match next_event(&mut sub).await {
        Event::Message(msg) => assert_eq!(msg.payload, json!("first")),
        other => panic!("expected Message, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 21: network failure on a poll is retried from the same cursor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_timeout_is_retried_from_same_cursor() {
    let server = MockServer::start();
    let stalled = server.mock(|when, then| {
        when.method(GET).path(subscribe_path(500));
        then.status(200)
            .delay(Duration::from_secs(2))
            .body(cursor_body(600, json!([])));
    });

    let timing = TimingConfig {
        subscribe_timeout: Duration::from_millis(200),
        ..fast_timing()
    };
    let client = PubNub::new(test_config(&server).timing(timing)).unwrap();
    let mut sub = client
        .subscribe()
        .channels(["ch"])
        .cursor(pubnub_client::Cursor::new(500))
        .execute()
        .await
        .unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::Connected));
    assert!(matches!(
        next_event(&mut sub).await,
        Event::Disconnected { .. }
    ));

    tokio::time::timeout(Duration::from_secs(5), async {
        while stalled.hits() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    sub.close();
}

// ---------------------------------------------------------------------------
// Test 22: publish network failure is returned without retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_timeout_returns_network_error_once() {
    let server = MockServer::start();
    let stalled = server.mock(|when, then| {
        when.path_contains("/publish/");
        then.status(200)
            .delay(Duration::from_secs(1))
            .body(r#"[1,"Sent","1"]"#);
    });

    let timing = TimingConfig {
        non_subscribe_timeout: Duration::from_millis(200),
        ..fast_timing()
    };
    let client = PubNub::new(test_config(&server).timing(timing)).unwrap();
    let err = client
        .publish()
        .channel("ch")
        .message("slow")
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(ref e) if e.is_timeout()), "{err:?}");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(stalled.hits(), 1);
}

#[tokio::test]
async fn publish_to_closed_port_returns_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = Config::new(PUB_KEY, SUB_KEY)
        .origin(format!("127.0.0.1:{port}"))
        .secure(false)
        .timing(fast_timing());
    let client = PubNub::new(config).unwrap();

    let err = client
        .publish()
        .channel("ch")
        .message("x")
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)), "{err:?}");
}
