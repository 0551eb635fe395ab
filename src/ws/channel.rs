//! Channel manager: the background task that owns the socket.
//!
//! One tokio task per manager runs the whole lifecycle: connect, send the
//! auth and subscribe envelopes, then route entity updates into the canonical
//! store until the connection dies, and reconnect after the policy delay.
//! The public handle only observes state, consumes diagnostic events, and
//! requests disconnection; it never touches the socket.
//!
//! Every update is stamped with a receipt-time sequence before merging, so
//! replays after a reconnect can never push the store backwards.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::auth::{auth_message, WalletSigner};
use crate::error::WsError;
use crate::store::{CanonicalStore, EntityKind, Sequence, Source};
use crate::ws::{ChannelConfig, ChannelEvent, ChannelState, Inbound, Outbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// ─── Commands from public API to background task ─────────────────────────────

enum Command {
    Disconnect,
}

enum DisconnectReason {
    UserRequested,
    Dead { code: Option<u16>, reason: String },
}

// ─── Background task state ───────────────────────────────────────────────────

struct TaskState {
    config: ChannelConfig,
    store: Arc<CanonicalStore>,
    signer: Option<Arc<dyn WalletSigner>>,
    event_tx: mpsc::Sender<ChannelEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    state: Arc<AtomicU8>,
}

impl TaskState {
    /// Lossy emit: a slow consumer must never stall the socket loop.
    fn emit(&self, event: ChannelEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.event_tx.try_send(event) {
            debug!("event buffer full, dropping {:?}", event);
        }
    }

    fn set_state(&self, next: ChannelState) {
        self.state.store(next as u8, Ordering::SeqCst);
    }
}

// ─── Public handle ───────────────────────────────────────────────────────────

/// Handle to a running realtime channel.
///
/// Created by [`ChannelManager::connect`], which spawns the background task
/// immediately. Dropping the handle aborts the task.
pub struct ChannelManager {
    state: Arc<AtomicU8>,
    cmd_tx: mpsc::Sender<Command>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<ChannelEvent>>,
    task: JoinHandle<()>,
}

impl ChannelManager {
    /// Spawns the connection task. Updates start flowing into `store` as
    /// soon as the handshake completes; progress is observable through
    /// [`ChannelManager::state`] and [`ChannelManager::events`].
    pub fn connect(
        config: ChannelConfig,
        store: Arc<CanonicalStore>,
        signer: Option<Arc<dyn WalletSigner>>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let state = Arc::new(AtomicU8::new(ChannelState::Disconnected as u8));

        let task_state = TaskState {
            config,
            store,
            signer,
            event_tx,
            cmd_rx,
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(run_task(task_state));

        Self {
            state,
            cmd_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
            task,
        }
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_subscribed(&self) -> bool {
        self.state() == ChannelState::Subscribed
    }

    /// Whether the background task is still alive. Holds through backoff
    /// windows, where [`ChannelManager::state`] already reads `Disconnected`;
    /// turns false only once the task has exited for good.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Closes the connection and stops reconnecting. Safe to call from any
    /// phase, including mid-backoff.
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect).await;
    }

    /// Stream of diagnostic events.
    ///
    /// The stream borrows `self`; drop it before dropping the manager.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = ChannelEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(
            &self.event_rx,
            |rx| async move {
                let mut guard = rx.lock().await;
                guard.recv().await.map(|event| (event, rx))
            },
        ))
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn run_task(mut state: TaskState) {
    let mut attempt: u32 = 0;
    loop {
        state.set_state(ChannelState::Connecting);
        let socket =
            match attempt_connect(&state.config.ws_url, state.config.connect_timeout_ms).await {
                Ok(socket) => socket,
                Err(err) => {
                    warn!("connection to {} failed: {}", state.config.ws_url, err);
                    state.emit(ChannelEvent::Error(err));
                    state.set_state(ChannelState::Disconnected);
                    attempt += 1;
                    if !backoff_or_disconnect(&mut state, attempt).await {
                        return;
                    }
                    continue;
                }
            };
        info!("connected to {}", state.config.ws_url);
        state.emit(ChannelEvent::Connected);

        let (mut sink, stream) = socket.split();

        state.set_state(ChannelState::Authenticating);
        if let Err(err) = handshake(&mut sink, &state.config, state.signer.as_deref()).await {
            warn!("handshake failed: {}", err);
            state.emit(ChannelEvent::Error(err));
            let _ = sink.close().await;
            state.set_state(ChannelState::Disconnected);
            attempt += 1;
            if !backoff_or_disconnect(&mut state, attempt).await {
                return;
            }
            continue;
        }

        state.set_state(ChannelState::Subscribed);
        state.emit(ChannelEvent::Subscribed);
        attempt = 0;

        let reason = run_subscribed(&mut state, sink, stream).await;
        state.set_state(ChannelState::Disconnected);
        match reason {
            DisconnectReason::UserRequested => {
                state.emit(ChannelEvent::Disconnected {
                    code: Some(1000),
                    reason: "client disconnect".into(),
                });
                return;
            }
            DisconnectReason::Dead { code, reason } => {
                state.emit(ChannelEvent::Disconnected { code, reason });
                attempt += 1;
                if !backoff_or_disconnect(&mut state, attempt).await {
                    return;
                }
            }
        }
    }
}

/// Sleeps out the reconnect delay. Returns false when the user disconnected
/// (or dropped the handle) during the wait.
async fn backoff_or_disconnect(state: &mut TaskState, attempt: u32) -> bool {
    let delay = state.config.reconnect.delay_for(attempt);
    info!("reconnect attempt {} in {:?}", attempt, delay);
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        cmd = state.cmd_rx.recv() => match cmd {
            Some(Command::Disconnect) | None => false,
        },
    }
}

/// Sends the auth envelope (when credentials and a signer are present) and
/// the subscribe envelope. The session counts as subscribed once both are on
/// the wire; the venue does not ack them.
async fn handshake(
    sink: &mut WsSink,
    config: &ChannelConfig,
    signer: Option<&dyn WalletSigner>,
) -> Result<(), WsError> {
    if let (Some(api_key), Some(signer)) = (config.api_key.as_ref(), signer) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let message = auth_message(api_key, timestamp);
        let signature = signer
            .sign_message(&message)
            .await
            .map_err(|err| WsError::ConnectionFailed(format!("auth signing failed: {}", err)))?;
        send_envelope(
            sink,
            &Outbound::Auth {
                api_key: api_key.clone(),
                timestamp,
                signature: hex::encode(signature),
            },
        )
        .await?;
    }
    if !config.channels.is_empty() {
        send_envelope(
            sink,
            &Outbound::Subscribe {
                channels: config.channels.clone(),
            },
        )
        .await?;
    }
    Ok(())
}

/// The subscribed loop: route updates, keep the connection alive, watch for
/// close. Runs until the connection breaks or the user disconnects.
async fn run_subscribed(
    state: &mut TaskState,
    mut sink: WsSink,
    mut stream: SplitStream<WsStream>,
) -> DisconnectReason {
    let ping_dur = Duration::from_millis(state.config.ping_interval_ms);
    let pong_dur = Duration::from_millis(state.config.pong_timeout_ms);

    let mut ping_interval = tokio::time::interval(ping_dur);
    ping_interval.reset(); // skip immediate first tick

    let mut pong_deadline: Option<tokio::time::Instant> = None;
    let far_future = tokio::time::Instant::now() + Duration::from_secs(86_400);
    let pong_sleep = tokio::time::sleep_until(far_future);
    tokio::pin!(pong_sleep);

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Inbound>(text.as_ref()) {
                            Ok(inbound) => {
                                if let Some((kind, key)) = apply_update(&state.store, inbound).await {
                                    state.emit(ChannelEvent::Update { kind, key });
                                }
                            }
                            Err(err) => {
                                warn!("dropping unroutable message: {} (raw: {})", err, text.as_ref() as &str);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                        pong_sleep.as_mut().reset(far_future);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = close_details(frame.as_ref());
                        return DisconnectReason::Dead { code: Some(code), reason };
                    }
                    Some(Ok(_)) => {} // Binary, Frame
                    Some(Err(err)) => {
                        warn!("socket error: {}", err);
                        return DisconnectReason::Dead { code: None, reason: err.to_string() };
                    }
                    None => {
                        return DisconnectReason::Dead { code: None, reason: "stream ended".into() };
                    }
                }
            }

            cmd = state.cmd_rx.recv() => {
                match cmd {
                    Some(Command::Disconnect) | None => {
                        let _ = sink.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client disconnect".into(),
                        }))).await;
                        return DisconnectReason::UserRequested;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return DisconnectReason::Dead { code: None, reason: "ping send failed".into() };
                }
                let deadline = tokio::time::Instant::now() + pong_dur;
                pong_deadline = Some(deadline);
                pong_sleep.as_mut().reset(deadline);
            }

            () = &mut pong_sleep, if pong_deadline.is_some() => {
                warn!("no pong within {}ms, dropping connection", state.config.pong_timeout_ms);
                let _ = sink.close().await;
                return DisconnectReason::Dead { code: None, reason: "pong timeout".into() };
            }
        }
    }
}

/// Stamps the update with a receipt-time sequence and merges it. Returns the
/// routed entity and key, or None when the payload has no routable key.
async fn apply_update(store: &CanonicalStore, msg: Inbound) -> Option<(EntityKind, String)> {
    let seq = Sequence::now();
    match msg {
        Inbound::OrderUpdate { data } => {
            let Some(id) = data.id.clone() else {
                warn!("order update without id dropped");
                return None;
            };
            store.merge_order(id.clone(), data, Source::Push, seq).await;
            Some((EntityKind::Order, id.to_string()))
        }
        Inbound::PositionUpdate { data } => {
            let Some(id) = data.id.clone() else {
                warn!("position update without id dropped");
                return None;
            };
            store
                .merge_position(id.clone(), data, Source::Push, seq)
                .await;
            Some((EntityKind::Position, id.to_string()))
        }
        Inbound::BalanceUpdate { data } => {
            let Some(token) = data.token.clone() else {
                warn!("balance update without token dropped");
                return None;
            };
            store
                .merge_balance(token.clone(), data, Source::Push, seq)
                .await;
            Some((EntityKind::Balance, token.to_string()))
        }
        Inbound::MarketUpdate { data } => {
            let Some(symbol) = data.symbol.clone() else {
                warn!("market update without symbol dropped");
                return None;
            };
            store
                .merge_market(symbol.clone(), data, Source::Push, seq)
                .await;
            Some((EntityKind::Market, symbol.to_string()))
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn attempt_connect(url: &str, timeout_ms: u64) -> Result<WsStream, WsError> {
    let (socket, _) = tokio::time::timeout(Duration::from_millis(timeout_ms), connect_async(url))
        .await
        .map_err(|_| WsError::ConnectionFailed("connection timeout".to_string()))?
        .map_err(|err| WsError::ConnectionFailed(err.to_string()))?;
    Ok(socket)
}

async fn send_envelope(sink: &mut WsSink, msg: &Outbound) -> Result<(), WsError> {
    let json = serde_json::to_string(msg).map_err(|err| WsError::SendFailed(err.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|err| WsError::SendFailed(err.to_string()))
}

fn close_details(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (frame.code.into(), frame.reason.to_string()),
        None => (1006, "no close frame".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderPatch;
    use crate::shared::{OrderId, OrderStatus};
    use crate::ws::ReconnectPolicy;
    use rust_decimal::Decimal;

    #[test]
    fn test_close_details() {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert_eq!(close_details(Some(&frame)), (1000, "bye".to_string()));
        assert_eq!(close_details(None), (1006, "no close frame".to_string()));
    }

    #[tokio::test]
    async fn test_apply_update_requires_key() {
        let store = CanonicalStore::new();
        let routed = apply_update(
            &store,
            Inbound::OrderUpdate {
                data: OrderPatch {
                    filled: Some(Decimal::ONE),
                    ..Default::default()
                },
            },
        )
        .await;
        assert!(routed.is_none());
        assert!(store.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_apply_update_merges_as_push() {
        let store = CanonicalStore::new();
        let routed = apply_update(
            &store,
            Inbound::OrderUpdate {
                data: OrderPatch {
                    id: Some(OrderId::from("42")),
                    status: Some(OrderStatus::Open),
                    ..Default::default()
                },
            },
        )
        .await;
        assert_eq!(routed, Some((EntityKind::Order, "42".to_string())));
        assert_eq!(
            store.order(&OrderId::from("42")).await.unwrap().status,
            OrderStatus::Open
        );
    }

    #[tokio::test]
    async fn test_disconnect_stops_reconnect_loop() {
        let config = ChannelConfig {
            // Nothing listens here; every attempt fails fast.
            ws_url: "ws://127.0.0.1:9".into(),
            reconnect: ReconnectPolicy::Fixed { delay_ms: 5_000 },
            connect_timeout_ms: 200,
            ..ChannelConfig::default()
        };
        let manager = ChannelManager::connect(config, Arc::new(CanonicalStore::new()), None);

        // Mid-backoff the task is parked but alive: state reads Disconnected
        // while the manager still owns the retry loop.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.state(), ChannelState::Disconnected);
        assert!(manager.is_running());

        manager.disconnect().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state(), ChannelState::Disconnected);
        assert!(!manager.is_running());
    }
}
