//! Realtime channel against a local WebSocket server: resubscribe after a
//! dropped connection, replay safety, and the auth handshake ordering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use geodesic::auth::WalletSigner;
use geodesic::error::AuthError;
use geodesic::shared::{AccountId, OrderId, OrderStatus, TokenId};
use geodesic::store::{CanonicalStore, EntityKind};
use geodesic::ws::{
    ChannelConfig, ChannelEvent, ChannelManager, ChannelState, ReconnectPolicy,
};

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn next_event(events: &mut (impl Stream<Item = ChannelEvent> + Unpin)) -> ChannelEvent {
    tokio::time::timeout(EVENT_WAIT, events.next())
        .await
        .expect("timed out waiting for a channel event")
        .expect("event stream ended")
}

/// Reads frames until a text frame arrives, decoded as JSON.
async fn read_json(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
    loop {
        let msg = ws
            .next()
            .await
            .expect("client hung up")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("client sent invalid json");
        }
    }
}

/// Keeps the connection alive, answering pings, until the client closes.
async fn drain_until_close(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Ping(payload) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

#[tokio::test]
async fn reconnect_resubscribes_and_replay_cannot_regress_store() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First session: one order push, then a hard drop with no close
        // frame.
        let (stream, _) = listener.accept().await.expect("first accept failed");
        let mut ws = accept_async(stream).await.expect("first handshake failed");
        let _subscribe = read_json(&mut ws).await;
        ws.send(Message::text(
            r#"{"type":"order_update","data":{"id":"42","status":"open","filled":"0.5","amount":"1.5"}}"#,
        ))
        .await
        .expect("first push failed");
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(ws);

        // Second session: replay an older fill for the same order, then a
        // balance push.
        let (stream, _) = listener.accept().await.expect("second accept failed");
        let mut ws = accept_async(stream).await.expect("second handshake failed");
        let _subscribe = read_json(&mut ws).await;
        ws.send(Message::text(
            r#"{"type":"order_update","data":{"id":"42","status":"open","filled":"0.25","amount":"1.5"}}"#,
        ))
        .await
        .expect("replay push failed");
        ws.send(Message::text(
            r#"{"type":"balance_update","data":{"token":"USDC","free":"100","locked":"25"}}"#,
        ))
        .await
        .expect("balance push failed");
        drain_until_close(&mut ws).await;
    });

    let store = Arc::new(CanonicalStore::new());
    let config = ChannelConfig {
        ws_url: format!("ws://{}", addr),
        reconnect: ReconnectPolicy::Fixed { delay_ms: 100 },
        connect_timeout_ms: 1_000,
        ..ChannelConfig::default()
    };
    let manager = ChannelManager::connect(config, Arc::clone(&store), None);
    let mut events = manager.events();

    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Connected), "got {event:?}");
    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Subscribed), "got {event:?}");
    match next_event(&mut events).await {
        ChannelEvent::Update { kind, key } => {
            assert_eq!(kind, EntityKind::Order);
            assert_eq!(key, "42");
        }
        other => panic!("expected an order update, got {other:?}"),
    }

    // The server dropped the socket without a close frame.
    let event = next_event(&mut events).await;
    assert!(
        matches!(event, ChannelEvent::Disconnected { code: None, .. }),
        "got {event:?}"
    );

    // Reconnect under the fixed policy, resubscribe, and the second
    // session's pushes flow.
    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Connected), "got {event:?}");
    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Subscribed), "got {event:?}");
    match next_event(&mut events).await {
        ChannelEvent::Update { kind, key } => {
            assert_eq!(kind, EntityKind::Order);
            assert_eq!(key, "42");
        }
        other => panic!("expected the replayed order update, got {other:?}"),
    }
    match next_event(&mut events).await {
        ChannelEvent::Update { kind, key } => {
            assert_eq!(kind, EntityKind::Balance);
            assert_eq!(key, "USDC");
        }
        other => panic!("expected a balance update, got {other:?}"),
    }

    // Nothing else was pushed; no duplicate re-emission.
    let quiet = tokio::time::timeout(Duration::from_millis(200), events.next()).await;
    assert!(quiet.is_err(), "unexpected event: {quiet:?}");

    // The replayed 0.25 fill merged without rolling the fill back.
    let order = store.order(&OrderId::from("42")).await.unwrap();
    assert_eq!(order.filled, dec("0.5"));
    assert_eq!(order.amount, dec("1.5"));
    assert_eq!(order.status, OrderStatus::Open);

    let balance = store.balance(&TokenId::from("USDC")).await.unwrap();
    assert_eq!(balance.free, dec("100"));
    assert_eq!(balance.locked, dec("25"));
    assert_eq!(balance.total, dec("125"));

    manager.disconnect().await;
    let event = next_event(&mut events).await;
    assert!(
        matches!(
            event,
            ChannelEvent::Disconnected {
                code: Some(1000),
                ..
            }
        ),
        "got {event:?}"
    );
    drop(events);
    assert_eq!(manager.state(), ChannelState::Disconnected);

    tokio::time::timeout(EVENT_WAIT, server)
        .await
        .expect("server script did not finish")
        .expect("server script panicked");
}

struct StubSigner;

#[async_trait]
impl WalletSigner for StubSigner {
    fn address(&self) -> AccountId {
        AccountId::from("0xstub")
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<Vec<u8>, AuthError> {
        Ok(vec![7u8; 64])
    }
}

#[tokio::test]
async fn auth_envelope_precedes_subscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept failed");
        let mut ws = accept_async(stream).await.expect("handshake failed");
        let first = read_json(&mut ws).await;
        let second = read_json(&mut ws).await;
        drain_until_close(&mut ws).await;
        (first, second)
    });

    let config = ChannelConfig {
        ws_url: format!("ws://{}", addr),
        api_key: Some("gk_test".to_string()),
        connect_timeout_ms: 1_000,
        ..ChannelConfig::default()
    };
    let manager = ChannelManager::connect(
        config,
        Arc::new(CanonicalStore::new()),
        Some(Arc::new(StubSigner)),
    );
    let mut events = manager.events();

    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Connected), "got {event:?}");
    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Subscribed), "got {event:?}");

    manager.disconnect().await;
    drop(events);

    let (first, second) = tokio::time::timeout(EVENT_WAIT, server)
        .await
        .expect("server script did not finish")
        .expect("server script panicked");

    assert_eq!(first["type"], "auth");
    assert_eq!(first["apiKey"], "gk_test");
    assert!(first["timestamp"].is_i64());
    assert_eq!(first["signature"], hex::encode(vec![7u8; 64]));

    assert_eq!(second["type"], "subscribe");
    assert_eq!(
        second["channels"],
        serde_json::json!(["orders", "positions", "balances", "markets"])
    );
}
