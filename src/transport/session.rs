//! Websocket session with reconnection.
//!
//! # Lifecycle
//!
//! 1. `connect()` — spawn the supervisor, await the first handshake
//! 2. `send()` — hand frames to the live connection (`false` when down)
//! 3. `on_event()` — register the single inbound-frame callback
//! 4. `shutdown()` — tear everything down; never reconnects afterwards
//!
//! # Reconnection policy
//!
//! Unexpected closes and dial failures re-dial with exponential backoff
//! (base doubling, capped), reset after a successful connection.
//! `reconnect()` skips any pending backoff delay. Explicit shutdown and loss
//! of authentication stop the loop for good.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use super::protocol::{ClientFrame, ServerFrame};
use super::{Outbound, TransportError};
use crate::auth::AuthProvider;
use crate::config::ChatConfig;

/// Frames queued for the writer before `send` reports not-connected.
const OUTBOUND_QUEUE: usize = 64;

/// Callback invoked for every parsed inbound frame.
pub type FrameHandler = Arc<dyn Fn(ServerFrame) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection health snapshot for display.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    /// Round-trip estimate from the most recent liveness ping.
    pub latency_ms: Option<u64>,
    /// Cumulative re-dials since this session was created.
    pub reconnects: u64,
}

#[derive(Default)]
struct Details {
    last_error: Option<String>,
    latency_ms: Option<u64>,
    reconnects: u64,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    details: Mutex<Details>,
    outbound: Mutex<Option<mpsc::Sender<ClientFrame>>>,
    handler: Mutex<Option<FrameHandler>>,
    /// Nudged by `reconnect()` to skip the current backoff delay.
    retry: Notify,
    pending_ping: Mutex<Option<Instant>>,
}

/// One authenticated realtime connection.
///
/// At most one live transport exists per session: the supervisor task only
/// dials again after the previous connection has fully exited.
pub struct TransportSession {
    url: String,
    connect_timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
    ping_interval: Duration,
    auth: Arc<dyn AuthProvider>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    pub fn new(config: &ChatConfig, auth: Arc<dyn AuthProvider>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: config.realtime_url.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            auth,
            shared: Arc::new(Shared {
                state,
                details: Mutex::new(Details::default()),
                outbound: Mutex::new(None),
                handler: Mutex::new(None),
                retry: Notify::new(),
                pending_ping: Mutex::new(None),
            }),
            shutdown: CancellationToken::new(),
            supervisor: Mutex::new(None),
        }
    }

    /// Register the inbound-frame callback. Exactly one handler is active;
    /// registering again replaces the previous one.
    pub fn on_event(&self, handler: impl Fn(ServerFrame) + Send + Sync + 'static) {
        *self.shared.handler.lock().unwrap() = Some(Arc::new(handler));
    }

    pub fn stats(&self) -> ConnectionStats {
        let details = self.shared.details.lock().unwrap();
        ConnectionStats {
            state: *self.shared.state.borrow(),
            last_error: details.last_error.clone(),
            latency_ms: details.latency_ms,
            reconnects: details.reconnects,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.state.borrow() == ConnectionState::Connected
    }

    /// Hand a frame to the live connection.
    ///
    /// Returns `false` when there is no live connection or the writer queue
    /// is full; the caller shows a transient affordance instead of crashing.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        if *self.shared.state.borrow() != ConnectionState::Connected {
            return false;
        }
        let guard = self.shared.outbound.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx.try_send(frame.clone()).is_ok(),
            None => false,
        }
    }

    /// Establish the connection. Idempotent: a no-op while already
    /// connected or connecting. Awaits until the first handshake resolves;
    /// failure lands in `stats().last_error`, it is never returned.
    pub async fn connect(&self) {
        self.ensure_supervisor().await;
    }

    /// Operator-triggered retry: dial again immediately, skipping any
    /// pending backoff delay. A no-op while connected.
    pub async fn reconnect(&self) {
        self.ensure_supervisor().await;
    }

    async fn ensure_supervisor(&self) {
        if self.shutdown.is_cancelled() {
            log::warn!("Transport: connect after shutdown ignored");
            return;
        }
        if !self.auth.is_authenticated() {
            log::warn!("Transport: refusing to connect without authentication");
            self.shared.details.lock().unwrap().last_error =
                Some(TransportError::NotAuthenticated.to_string());
            return;
        }

        {
            let mut sup = self.supervisor.lock().unwrap();
            let running = sup.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
            if running {
                match *self.shared.state.borrow() {
                    // Already live or mid-handshake: nothing to do.
                    ConnectionState::Connected => return,
                    ConnectionState::Connecting => {}
                    // Waiting out a backoff delay: skip it.
                    ConnectionState::Disconnected => self.shared.retry.notify_one(),
                }
            } else {
                // Mark Connecting before the spawn so callers can await the
                // handshake below without racing the supervisor startup.
                self.shared.state.send_replace(ConnectionState::Connecting);
                let ctx = SupervisorCtx {
                    url: self.url.clone(),
                    connect_timeout: self.connect_timeout,
                    base_delay: self.base_delay,
                    max_delay: self.max_delay,
                    ping_interval: self.ping_interval,
                    auth: self.auth.clone(),
                    shared: self.shared.clone(),
                    shutdown: self.shutdown.clone(),
                };
                *sup = Some(tokio::spawn(run_supervisor(ctx)));
            }
        }

        // Await the handshake outcome (connected, or failed into backoff).
        let mut rx = self.shared.state.subscribe();
        while *rx.borrow_and_update() == ConnectionState::Connecting {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Tear down the transport for good (logout/unmount). Idempotent; also
    /// cancels any pending reconnect timer.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.supervisor.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.shared.outbound.lock().unwrap() = None;
        self.shared.state.send_replace(ConnectionState::Disconnected);
        log::info!("Transport: shut down");
    }
}

impl Outbound for TransportSession {
    fn send_frame(&self, frame: &ClientFrame) -> bool {
        self.send(frame)
    }

    fn connection_stats(&self) -> ConnectionStats {
        self.stats()
    }
}

struct SupervisorCtx {
    url: String,
    connect_timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
    ping_interval: Duration,
    auth: Arc<dyn AuthProvider>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

/// Exponential backoff, capped.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32 << attempt.min(16);
    base.saturating_mul(factor).min(max)
}

async fn run_supervisor(ctx: SupervisorCtx) {
    let mut attempt: u32 = 0;
    let mut first_dial = true;

    loop {
        if ctx.shutdown.is_cancelled() {
            break;
        }
        if !ctx.auth.is_authenticated() {
            log::warn!("Transport: principal signed out, stopping reconnection");
            ctx.shared.details.lock().unwrap().last_error =
                Some(TransportError::NotAuthenticated.to_string());
            break;
        }

        ctx.shared.state.send_replace(ConnectionState::Connecting);
        if !first_dial {
            ctx.shared.details.lock().unwrap().reconnects += 1;
        }
        first_dial = false;

        match try_connect(&ctx).await {
            Ok(ws) => {
                attempt = 0;
                ctx.shared.details.lock().unwrap().last_error = None;
                let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
                *ctx.shared.outbound.lock().unwrap() = Some(out_tx);
                ctx.shared.state.send_replace(ConnectionState::Connected);
                log::info!("Transport: connected to {}", ctx.url);

                let reason = run_connection(&ctx, ws, out_rx).await;
                *ctx.shared.outbound.lock().unwrap() = None;
                if ctx.shutdown.is_cancelled() {
                    break;
                }
                log::warn!("Transport: connection lost: {}", reason);
                ctx.shared.state.send_replace(ConnectionState::Disconnected);
                ctx.shared.details.lock().unwrap().last_error =
                    Some(TransportError::Disconnected(reason).to_string());
            }
            Err(e) => {
                log::warn!("Transport: {}", e);
                ctx.shared.state.send_replace(ConnectionState::Disconnected);
                ctx.shared.details.lock().unwrap().last_error = Some(e.to_string());
            }
        }

        let delay = backoff_delay(attempt, ctx.base_delay, ctx.max_delay);
        attempt = attempt.saturating_add(1);
        log::debug!("Transport: next dial in {:?}", delay);
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            _ = ctx.shared.retry.notified() => {
                log::info!("Transport: manual reconnect requested");
            }
            _ = sleep(delay) => {}
        }
    }

    ctx.shared.state.send_replace(ConnectionState::Disconnected);
    log::debug!("Transport: supervisor exiting");
}

async fn try_connect(
    ctx: &SupervisorCtx,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, TransportError> {
    let mut request = ctx
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    if let Some(token) = ctx.auth.bearer_token() {
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?,
        );
    }

    let (ws, _response) = timeout(ctx.connect_timeout, connect_async(request))
        .await
        .map_err(|_| TransportError::ConnectionFailed("handshake timeout".to_string()))?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    Ok(ws)
}

/// Drive one live connection until it drops. Returns the close reason.
async fn run_connection(
    ctx: &SupervisorCtx,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::Receiver<ClientFrame>,
) -> String {
    let (mut write, mut read) = ws.split();
    let mut ping = interval(ctx.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                let _ = write.close().await;
                return "shut down".to_string();
            }
            maybe = out_rx.recv() => match maybe {
                Some(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(t) => t,
                        Err(e) => {
                            log::warn!("Transport: failed to encode frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return format!("send failed: {}", e);
                    }
                }
                None => return "outbound channel closed".to_string(),
            },
            _ = ping.tick() => {
                *ctx.shared.pending_ping.lock().unwrap() = Some(Instant::now());
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    return format!("ping failed: {}", e);
                }
            }
            item = read.next() => match item {
                Some(Ok(Message::Text(text))) => dispatch_frame(ctx, &text),
                Some(Ok(Message::Pong(_))) => {
                    if let Some(sent) = ctx.shared.pending_ping.lock().unwrap().take() {
                        let rtt = sent.elapsed().as_millis() as u64;
                        ctx.shared.details.lock().unwrap().latency_ms = Some(rtt);
                    }
                }
                Some(Ok(Message::Close(_))) => return "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("socket error: {}", e),
                None => return "stream ended".to_string(),
            },
        }
    }
}

fn dispatch_frame(ctx: &SupervisorCtx, text: &str) {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Transport: unparseable frame dropped: {}", e);
            return;
        }
    };
    if matches!(frame, ServerFrame::Unknown) {
        log::debug!("Transport: ignoring unknown frame type");
        return;
    }
    // Clone out of the lock so a slow handler cannot block registration.
    let handler = ctx.shared.handler.lock().unwrap().clone();
    match handler {
        Some(handler) => handler(frame),
        None => log::debug!("Transport: frame received before handler registered"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn test_config(port: u16) -> ChatConfig {
        ChatConfig {
            realtime_url: format!("ws://127.0.0.1:{}/ws/chat", port),
            connect_timeout_ms: 2_000,
            reconnect_base_delay_ms: 20,
            reconnect_max_delay_ms: 100,
            ping_interval_ms: 10_000,
            ..ChatConfig::default()
        }
    }

    /// Echo server that counts accepted connections and replies to every
    /// text frame with an assistant message frame.
    async fn spawn_echo_server() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(_) = msg {
                            let reply = r#"{"type":"message","id":"srv-1","role":"assistant","content":"ack"}"#;
                            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        (port, accepted)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(500);
        assert_eq!(backoff_delay(0, base, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(400));
        assert_eq!(backoff_delay(3, base, max), max);
        assert_eq!(backoff_delay(30, base, max), max);
    }

    #[tokio::test]
    async fn send_before_connect_returns_false() {
        let config = test_config(1);
        let session = TransportSession::new(&config, Arc::new(StaticAuth::new("t")));
        let msg = crate::chat::ChatMessage::operator("status", vec![]);
        assert!(!session.send(&ClientFrame::message(&msg)));
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (port, accepted) = spawn_echo_server().await;
        let session = TransportSession::new(&test_config(port), Arc::new(StaticAuth::new("t")));

        session.connect().await;
        session.connect().await;
        assert!(session.is_connected());
        // Give any (erroneous) second dial time to land.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn send_and_receive_roundtrip() {
        let (port, _) = spawn_echo_server().await;
        let session = TransportSession::new(&test_config(port), Arc::new(StaticAuth::new("t")));

        let (tx, mut rx) = mpsc::channel::<ServerFrame>(8);
        session.on_event(move |frame| {
            let _ = tx.try_send(frame);
        });

        session.connect().await;
        assert!(session.is_connected());

        let msg = crate::chat::ChatMessage::operator("status", vec![]);
        assert!(session.send(&ClientFrame::message(&msg)));

        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("reply in time")
            .expect("frame");
        match frame {
            ServerFrame::Message { message } => {
                assert_eq!(message.id.as_deref(), Some("srv-1"));
                assert_eq!(message.content, "ack");
            }
            other => panic!("expected Message, got {:?}", other),
        }

        session.shutdown().await;
    }

    #[tokio::test]
    async fn refuses_to_connect_without_auth() {
        let (port, accepted) = spawn_echo_server().await;
        let session = TransportSession::new(&test_config(port), Arc::new(StaticAuth::logged_out()));

        session.connect().await;
        assert!(!session.is_connected());
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
        assert!(session.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn reconnects_after_server_drop() {
        // Server that accepts and immediately drops the first connection.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    if n == 0 {
                        // First connection: close right away.
                        let _ = ws.close(None).await;
                        return;
                    }
                    while ws.next().await.is_some() {}
                });
            }
        });

        let session = TransportSession::new(&test_config(port), Arc::new(StaticAuth::new("t")));
        session.connect().await;

        // Backoff base is 20ms; the re-dial should land well within a second.
        let deadline = Instant::now() + Duration::from_secs(2);
        while accepted.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert!(accepted.load(Ordering::SeqCst) >= 2, "no reconnect observed");
        assert!(session.stats().reconnects >= 1);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn manual_reconnect_skips_backoff_delay() {
        // Server that drops the first connection, forcing the session into
        // a backoff far longer than this test is willing to wait.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    if n == 0 {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while ws.next().await.is_some() {}
                });
            }
        });

        let config = ChatConfig {
            reconnect_base_delay_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
            ..test_config(port)
        };
        let session = TransportSession::new(&config, Arc::new(StaticAuth::new("t")));
        session.connect().await;

        // Wait for the dropped connection to land in backoff.
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.is_connected() && Instant::now() < deadline {
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!session.is_connected());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        // An automatic re-dial is a minute away; the operator retry is not.
        session.reconnect().await;
        let deadline = Instant::now() + Duration::from_secs(2);
        while !session.is_connected() && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert!(session.is_connected(), "manual retry did not skip backoff");
        assert_eq!(accepted.load(Ordering::SeqCst), 2);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_reconnection() {
        let (port, accepted) = spawn_echo_server().await;
        let session = TransportSession::new(&test_config(port), Arc::new(StaticAuth::new("t")));

        session.connect().await;
        session.shutdown().await;
        session.shutdown().await; // idempotent

        assert_eq!(session.stats().state, ConnectionState::Disconnected);
        let msg = crate::chat::ChatMessage::operator("x", vec![]);
        assert!(!session.send(&ClientFrame::message(&msg)));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        // Connect after shutdown stays down.
        session.connect().await;
        assert!(!session.is_connected());
    }
}
