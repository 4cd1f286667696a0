//! Gateway Connector
//!
//! Persistent-connection RPC client that mirrors local kills onto the
//! live agent host. Four-state machine with id-correlated requests over
//! newline-delimited JSON frames; every outstanding request carries a
//! deadline and releases its pending slot on expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::protocol::{methods, IncomingFrame, RequestFrame, EVENT_HELLO_OK};
use crate::constants;
use crate::logic::events::{channels, EventBus, ACTION_KILL_SWITCH};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not connected to gateway")]
    NotConnected,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed before response arrived")]
    ChannelClosed,
    #[error("gateway error {code}: {message}")]
    Remote { code: String, message: String },
    #[error("channel failure: {0}")]
    Channel(String),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Local error code. `NOT_CONNECTED` is synthesized here, never sent
    /// over the wire.
    pub fn code(&self) -> &str {
        match self {
            GatewayError::NotConnected => "NOT_CONNECTED",
            GatewayError::Timeout(_) => "TIMEOUT",
            GatewayError::ChannelClosed => "CHANNEL_CLOSED",
            GatewayError::Remote { code, .. } => code,
            GatewayError::Channel(_) => "CHANNEL_FAILURE",
            GatewayError::Encode(_) => "ENCODE_FAILURE",
        }
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticated => "authenticated",
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Authenticated)
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: constants::get_gateway_token(),
            request_timeout: Duration::from_secs(constants::get_gateway_timeout_secs()),
        }
    }
}

// ============================================================================
// TERMINATION OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminateMethod {
    SessionsStop,
    AgentStop,
}

impl TerminateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminateMethod::SessionsStop => methods::SESSIONS_STOP,
            TerminateMethod::AgentStop => methods::AGENT_STOP,
        }
    }
}

/// Result of the remote-termination fallback chain. `success = false`
/// only when both methods are exhausted.
#[derive(Debug, Clone, Serialize)]
pub struct TerminateOutcome {
    pub success: bool,
    pub method: TerminateMethod,
    pub error: Option<String>,
}

/// Kill notification lifted off the event bus.
#[derive(Debug, Clone)]
pub struct KillNotice {
    pub session_id: String,
    pub agent_id: String,
    pub reason: String,
}

// ============================================================================
// CONNECTOR
// ============================================================================

struct ConnectorInner {
    config: GatewayConfig,
    state: Mutex<ConnectionState>,
    pending: Mutex<HashMap<String, oneshot::Sender<super::protocol::ResponseFrame>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    kill_count: AtomicU64,
}

impl ConnectorInner {
    fn handle_line(&self, line: &str) {
        match serde_json::from_str::<IncomingFrame>(line) {
            Ok(IncomingFrame::Event(event)) => {
                if event.event == EVENT_HELLO_OK {
                    *self.state.lock() = ConnectionState::Authenticated;
                    log::info!("Gateway handshake accepted, connection authenticated");
                } else {
                    log::debug!("Unhandled gateway event '{}'", event.event);
                }
            }
            Ok(IncomingFrame::Response(response)) => {
                match self.pending.lock().remove(&response.id) {
                    // The receiver cancels its timeout when this resolves.
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => log::debug!("Response for unknown or expired request {}", response.id),
                }
            }
            Err(e) => log::warn!("Dropping unparseable gateway frame: {}", e),
        }
    }

    /// Tear down channel state. Dropping the pending senders resolves
    /// every in-flight request as `CHANNEL_CLOSED`.
    fn disconnect(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
        *self.outbound.lock() = None;
        self.pending.lock().clear();
    }
}

#[derive(Clone)]
pub struct GatewayConnector {
    inner: Arc<ConnectorInner>,
}

impl GatewayConnector {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                kill_count: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Outstanding request count (observability and leak tests).
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Remote terminations executed on this connection's lifetime.
    pub fn kill_count(&self) -> u64 {
        self.inner.kill_count.load(Ordering::SeqCst)
    }

    /// Dial the agent host and start the protocol. Resolves once the
    /// channel is open; authentication completes asynchronously when the
    /// peer's `hello-ok` event arrives.
    pub async fn connect(&self, addr: &str) -> Result<(), GatewayError> {
        *self.inner.state.lock() = ConnectionState::Connecting;
        log::info!("Connecting to gateway at {}", addr);

        let stream = TcpStream::connect(addr).await.map_err(|e| {
            self.inner.disconnect();
            GatewayError::Channel(e.to_string())
        })?;
        self.attach(stream);
        Ok(())
    }

    /// Start the protocol over an already-open bidirectional channel and
    /// send the handshake. Split out of `connect` so tests can drive an
    /// in-memory duplex.
    pub fn attach<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        *self.inner.outbound.lock() = Some(tx);
        *self.inner.state.lock() = ConnectionState::Connected;

        // Writer: drain the outbound queue onto the wire.
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        });

        // Reader: correlate frames until the channel closes.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => inner.handle_line(&line),
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Gateway read failed: {}", e);
                        break;
                    }
                }
            }
            log::info!("Gateway channel closed");
            inner.disconnect();
        });

        // Handshake rides the normal request path; the connect operation
        // itself does not wait for it.
        let me = self.clone();
        let token = self.inner.config.token.clone();
        tokio::spawn(async move {
            match me
                .send_request(methods::CONNECT, json!({"role": "operator", "token": token}))
                .await
            {
                Ok(_) => log::debug!("Gateway handshake request acknowledged"),
                Err(e) => log::warn!("Gateway handshake request failed: {}", e),
            }
        });
    }

    /// Send one correlated request and await its response or deadline.
    /// Fails immediately with `NOT_CONNECTED` (and no pending entry) when
    /// the channel is not open.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        if !self.state().is_open() {
            return Err(GatewayError::NotConnected);
        }

        let id = Uuid::new_v4().to_string();
        let line = serde_json::to_string(&RequestFrame {
            id: id.clone(),
            method: method.to_string(),
            params,
        })?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id.clone(), tx);

        let sent = match self.inner.outbound.lock().as_ref() {
            Some(outbound) => outbound.send(line).is_ok(),
            None => false,
        };
        if !sent {
            self.inner.pending.lock().remove(&id);
            return Err(GatewayError::NotConnected);
        }

        let timeout = self.inner.config.request_timeout;
        match tokio::time::timeout(timeout, rx).await {
            // Deadline expired: release the slot so the map cannot grow
            // without bound under a flaky peer.
            Err(_) => {
                self.inner.pending.lock().remove(&id);
                Err(GatewayError::Timeout(timeout))
            }
            Ok(Err(_)) => Err(GatewayError::ChannelClosed),
            Ok(Ok(response)) => {
                if response.ok {
                    Ok(response.payload.unwrap_or(Value::Null))
                } else {
                    let error = response.error.unwrap_or(super::protocol::ErrorInfo {
                        code: "UNKNOWN".to_string(),
                        message: "gateway returned ok=false without error info".to_string(),
                    });
                    Err(GatewayError::Remote {
                        code: error.code,
                        message: error.message,
                    })
                }
            }
        }
    }

    /// Remote-termination fallback chain: `sessions.stop` first, then
    /// `agent.stop` against the bare agent id.
    pub async fn terminate_session(
        &self,
        session_key: &str,
        agent_id: &str,
        reason: &str,
    ) -> TerminateOutcome {
        match self
            .send_request(
                methods::SESSIONS_STOP,
                json!({"sessionKey": session_key, "reason": reason}),
            )
            .await
        {
            Ok(_) => {
                self.inner.kill_count.fetch_add(1, Ordering::SeqCst);
                TerminateOutcome {
                    success: true,
                    method: TerminateMethod::SessionsStop,
                    error: None,
                }
            }
            Err(first) => {
                log::warn!(
                    "sessions.stop failed for {} ({}), falling back to agent.stop",
                    session_key,
                    first
                );
                match self
                    .send_request(methods::AGENT_STOP, json!({"agentId": agent_id}))
                    .await
                {
                    Ok(_) => {
                        self.inner.kill_count.fetch_add(1, Ordering::SeqCst);
                        TerminateOutcome {
                            success: true,
                            method: TerminateMethod::AgentStop,
                            error: None,
                        }
                    }
                    Err(second) => {
                        log::error!("Remote termination exhausted for {}: {}", session_key, second);
                        TerminateOutcome {
                            success: false,
                            method: TerminateMethod::AgentStop,
                            error: Some(second.to_string()),
                        }
                    }
                }
            }
        }
    }

    /// Consume kill notices (from `subscribe_kill_events`) until the
    /// channel closes, mirroring each onto the remote host.
    pub async fn run_kill_listener(&self, mut notices: mpsc::UnboundedReceiver<KillNotice>) {
        while let Some(notice) = notices.recv().await {
            log::warn!(
                "Mirroring kill for session {} onto the agent host",
                notice.session_id
            );
            let outcome = self
                .terminate_session(&notice.session_id, &notice.agent_id, &notice.reason)
                .await;
            if outcome.success {
                log::info!(
                    "Remote termination of {} succeeded via {}",
                    notice.session_id,
                    outcome.method.as_str()
                );
            } else {
                log::error!(
                    "Remote termination of {} failed: {}",
                    notice.session_id,
                    outcome.error.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
}

/// Bridge the bus into the connector's async world: kill-switch actions
/// on `behavior.blocked` become `KillNotice` values on a tokio channel.
pub fn subscribe_kill_events(bus: &EventBus) -> mpsc::UnboundedReceiver<KillNotice> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe(channels::BEHAVIOR_BLOCKED, move |event| {
        let payload = &event.payload;
        if payload.get("action").and_then(Value::as_str) != Some(ACTION_KILL_SWITCH) {
            return;
        }
        let (Some(session_id), Some(agent_id)) = (
            payload.get("session_id").and_then(Value::as_str),
            payload.get("agent_id").and_then(Value::as_str),
        ) else {
            log::warn!("Kill notification without session/agent identifiers, ignored");
            return;
        };
        let _ = tx.send(KillNotice {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            reason: payload
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("kill switch")
                .to_string(),
        });
    });
    rx
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::gateway::protocol::{ErrorInfo, ResponseFrame};
    use tokio::io::DuplexStream;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            token: "test-token".to_string(),
            request_timeout: Duration::from_millis(200),
        }
    }

    /// Minimal fake agent host: answers each request line through the
    /// supplied responder; `None` means stay silent.
    fn spawn_host<F>(server: DuplexStream, mut respond: F)
    where
        F: FnMut(RequestFrame) -> Option<ResponseFrame> + Send + 'static,
    {
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(request) = serde_json::from_str::<RequestFrame>(&line) else {
                    continue;
                };
                if let Some(response) = respond(request) {
                    let mut out = serde_json::to_string(&response).unwrap();
                    out.push('\n');
                    if write_half.write_all(out.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    fn ok(id: String) -> ResponseFrame {
        ResponseFrame {
            id,
            ok: true,
            payload: Some(json!({"done": true})),
            error: None,
        }
    }

    fn fail(id: String, code: &str) -> ResponseFrame {
        ResponseFrame {
            id,
            ok: false,
            payload: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: format!("{} from host", code),
            }),
        }
    }

    async fn wait_for_state(connector: &GatewayConnector, state: ConnectionState) {
        for _ in 0..200 {
            if connector.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("connector never reached {:?}", state);
    }

    #[tokio::test]
    async fn test_send_request_while_disconnected_fails_fast() {
        let connector = GatewayConnector::new(test_config());
        assert_eq!(connector.state(), ConnectionState::Disconnected);

        let err = connector
            .send_request(methods::SESSIONS_STOP, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
        assert_eq!(err.code(), "NOT_CONNECTED");
        // No pending entry was created.
        assert_eq!(connector.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_opens_channel_and_sends_handshake() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        spawn_host(server, move |request| {
            let _ = seen_tx.send(request.clone());
            Some(ok(request.id))
        });
        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        // The handshake goes out immediately on open, operator role and
        // token included.
        let handshake = seen_rx.recv().await.unwrap();
        assert_eq!(handshake.method, methods::CONNECT);
        assert_eq!(handshake.params["role"], "operator");
        assert_eq!(handshake.params["token"], "test-token");
    }

    #[tokio::test]
    async fn test_hello_ok_event_transitions_to_authenticated() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        let (read_half, mut write_half) = tokio::io::split(server);
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Ok(request) = serde_json::from_str::<RequestFrame>(&line) {
                    if request.method == methods::CONNECT {
                        let response = serde_json::to_string(&ok(request.id)).unwrap();
                        let _ = write_half.write_all(response.as_bytes()).await;
                        let _ = write_half.write_all(b"\n").await;
                        let _ = write_half
                            .write_all(b"{\"type\":\"event\",\"event\":\"hello-ok\",\"payload\":{}}\n")
                            .await;
                    }
                }
            }
        });

        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Authenticated).await;
    }

    #[tokio::test]
    async fn test_out_of_order_responses_match_by_id() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        // Hold the first non-handshake request and answer it after the
        // second, with each payload echoing its method.
        let (read_half, mut write_half) = tokio::io::split(server);
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let mut held: Option<RequestFrame> = None;
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(request) = serde_json::from_str::<RequestFrame>(&line) else {
                    continue;
                };
                match request.method.as_str() {
                    "connect" => {
                        let out = serde_json::to_string(&ok(request.id)).unwrap();
                        let _ = write_half.write_all(format!("{}\n", out).as_bytes()).await;
                    }
                    "probe.first" => held = Some(request),
                    "probe.second" => {
                        let answer = |req: RequestFrame| {
                            let frame = ResponseFrame {
                                id: req.id,
                                ok: true,
                                payload: Some(json!({"method": req.method})),
                                error: None,
                            };
                            serde_json::to_string(&frame).unwrap()
                        };
                        let second = answer(request);
                        let _ = write_half.write_all(format!("{}\n", second).as_bytes()).await;
                        if let Some(first) = held.take() {
                            let first = answer(first);
                            let _ = write_half.write_all(format!("{}\n", first).as_bytes()).await;
                        }
                    }
                    _ => {}
                }
            }
        });

        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        let (first, second) = tokio::join!(
            connector.send_request("probe.first", json!({})),
            connector.send_request("probe.second", json!({})),
        );
        assert_eq!(first.unwrap()["method"], "probe.first");
        assert_eq!(second.unwrap()["method"], "probe.second");
        assert_eq!(connector.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_pending_slot() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        // Host answers the handshake but goes silent afterwards.
        spawn_host(server, |request| {
            (request.method == methods::CONNECT).then(|| ok(request.id))
        });
        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        let err = connector
            .send_request("probe.silent", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
        assert_eq!(connector.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_session_first_attempt_succeeds() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        spawn_host(server, |request| match request.method.as_str() {
            "connect" | "sessions.stop" => Some(ok(request.id)),
            other => panic!("unexpected method {}", other),
        });
        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        let outcome = connector.terminate_session("sess-9", "agent-9", "test kill").await;
        assert!(outcome.success);
        assert_eq!(outcome.method, TerminateMethod::SessionsStop);
        assert!(outcome.error.is_none());
        assert_eq!(connector.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_session_falls_back_to_agent_stop() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        spawn_host(server, |request| match request.method.as_str() {
            "connect" => Some(ok(request.id)),
            "sessions.stop" => Some(fail(request.id, "SESSION_NOT_FOUND")),
            "agent.stop" => {
                assert_eq!(request.params["agentId"], "agent-9");
                Some(ok(request.id))
            }
            other => panic!("unexpected method {}", other),
        });
        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        let outcome = connector.terminate_session("sess-9", "agent-9", "test kill").await;
        assert!(outcome.success);
        assert_eq!(outcome.method, TerminateMethod::AgentStop);
        assert_eq!(connector.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_session_reports_failure_when_both_exhausted() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        spawn_host(server, |request| match request.method.as_str() {
            "connect" => Some(ok(request.id)),
            "sessions.stop" => Some(fail(request.id, "SESSION_NOT_FOUND")),
            "agent.stop" => Some(fail(request.id, "AGENT_NOT_FOUND")),
            other => panic!("unexpected method {}", other),
        });
        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        let outcome = connector.terminate_session("sess-9", "agent-9", "test kill").await;
        assert!(!outcome.success);
        assert_eq!(outcome.method, TerminateMethod::AgentStop);
        // The second attempt's error is the one reported.
        assert!(outcome.error.unwrap().contains("AGENT_NOT_FOUND"));
        assert_eq!(connector.kill_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_close_resolves_inflight_and_disconnects() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        // Close the peer while the request is in flight.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(server);
        });

        let err = connector
            .send_request("probe.dead", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ChannelClosed | GatewayError::Timeout(_)
        ));
        wait_for_state(&connector, ConnectionState::Disconnected).await;
        assert_eq!(connector.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_kill_notice_bridging_from_bus() {
        let bus = EventBus::new();
        let mut notices = subscribe_kill_events(&bus);

        // Blocked event without the kill action is ignored.
        bus.publish(
            channels::BEHAVIOR_BLOCKED,
            json!({"session_id": "s1", "agent_id": "a1", "blocked": true}),
        );
        // Kill-switch action comes through.
        bus.publish(
            channels::BEHAVIOR_BLOCKED,
            json!({
                "session_id": "s1",
                "agent_id": "a1",
                "action": ACTION_KILL_SWITCH,
                "description": "Kill switch triggered: FS_SENSITIVE_PATH (1 critical event(s))",
            }),
        );

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.session_id, "s1");
        assert_eq!(notice.agent_id, "a1");
        assert!(notice.reason.contains("FS_SENSITIVE_PATH"));
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_kill_listener_drives_remote_termination() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = GatewayConnector::new(test_config());

        spawn_host(server, |request| match request.method.as_str() {
            "connect" | "sessions.stop" => Some(ok(request.id)),
            other => panic!("unexpected method {}", other),
        });
        connector.attach(client);
        wait_for_state(&connector, ConnectionState::Connected).await;

        let bus = EventBus::new();
        let notices = subscribe_kill_events(&bus);
        let listener = connector.clone();
        tokio::spawn(async move { listener.run_kill_listener(notices).await });

        bus.publish(
            channels::BEHAVIOR_BLOCKED,
            json!({
                "session_id": "sess-3",
                "agent_id": "agent-3",
                "action": ACTION_KILL_SWITCH,
                "description": "critical detection",
            }),
        );

        for _ in 0..200 {
            if connector.kill_count() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("remote termination never executed");
    }
}
