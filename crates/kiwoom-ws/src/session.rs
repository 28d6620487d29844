//! Streaming session state machine.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ AwaitingLogin ──LOGIN ok──▶ Authenticated
//!       ▲                                            │   ▲ PING echo              │ ▲ PING echo
//!       └─────────── (new cycle) ◀── Closed ◀────────┴───┴── close / error ───────┴─┘ data → sink
//! ```
//!
//! State and the attached transport live behind one lock. They are written
//! only by the transport callbacks (`begin_connect`, `on_open`, `on_text`,
//! `on_close`, `on_error`), which the connection driver invokes one at a
//! time; outbound callers only read them.

use crate::classifier::{classify, FrameKind};
use crate::connection::SessionConfig;
use crate::error::{WsError, WsResult};
use crate::message::{build_register, build_unregister, login_frame};
use crate::transport::FrameSender;
use kiwoom_auth::{AuthResult, BoxFuture, TokenAuthority, TokenIssuer};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingLogin,
    Authenticated,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::AwaitingLogin => write!(f, "AWAITING_LOGIN"),
            Self::Authenticated => write!(f, "AUTHENTICATED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Source of login tokens.
pub trait TokenSource: Send + Sync {
    /// A currently valid access token.
    fn access_token(&self) -> BoxFuture<'_, AuthResult<String>>;
}

impl<I: TokenIssuer> TokenSource for TokenAuthority<I> {
    fn access_token(&self) -> BoxFuture<'_, AuthResult<String>> {
        Box::pin(self.get_access_token())
    }
}

/// Decodes an authenticated data frame into a deliverable value.
pub trait FrameDecoder: Send + Sync {
    type Output: Send;

    /// `None` when the frame carries nothing deliverable.
    fn decode(&self, raw: &str) -> Option<Self::Output>;
}

/// Receives decoded values. Delivery is fire-and-forget.
pub trait QuoteSink<T>: Send + Sync {
    fn publish(&self, item: T);
}

/// What the session did with one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// PING echoed back.
    HeartbeatEchoed,
    /// LOGIN accepted; session is now authenticated.
    LoggedIn,
    /// LOGIN rejected; session still awaiting login.
    LoginRejected,
    /// Data decoded and handed to the sink.
    Published,
    /// Data frame the decoder had nothing for.
    DecodeMiss,
    /// Frame not valid in the current state.
    Dropped,
}

/// Frame counters for one session (all cycles).
#[derive(Debug, Default)]
pub struct SessionStats {
    heartbeats_echoed: AtomicU64,
    quotes_published: AtomicU64,
    decode_misses: AtomicU64,
    frames_dropped: AtomicU64,
    login_rejections: AtomicU64,
}

impl SessionStats {
    pub fn heartbeats_echoed(&self) -> u64 {
        self.heartbeats_echoed.load(Ordering::Relaxed)
    }

    pub fn quotes_published(&self) -> u64 {
        self.quotes_published.load(Ordering::Relaxed)
    }

    pub fn decode_misses(&self) -> u64 {
        self.decode_misses.load(Ordering::Relaxed)
    }

    /// Frames not handled in the state they arrived in: data before login,
    /// LOGIN results after login, and PING echoes that could not be queued.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn login_rejections(&self) -> u64 {
        self.login_rejections.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Inner {
    state: SessionState,
    transport: Option<Arc<dyn FrameSender>>,
    cancel: CancellationToken,
}

/// One connect → login → stream lifecycle at a time against the upstream.
pub struct StreamingSession<D, S> {
    config: SessionConfig,
    tokens: Arc<dyn TokenSource>,
    decoder: D,
    sink: S,
    inner: RwLock<Inner>,
    state_tx: watch::Sender<SessionState>,
    stats: SessionStats,
}

impl<D, S> StreamingSession<D, S>
where
    D: FrameDecoder,
    S: QuoteSink<D::Output>,
{
    pub fn new(config: SessionConfig, tokens: Arc<dyn TokenSource>, decoder: D, sink: S) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            tokens,
            decoder,
            sink,
            inner: RwLock::new(Inner {
                state: SessionState::Disconnected,
                transport: None,
                cancel: CancellationToken::new(),
            }),
            state_tx,
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Queue a text frame for the upstream.
    ///
    /// Best effort: with no transport attached, or one whose queue is
    /// closed, this logs a warning and returns `false` instead of failing.
    pub fn send(&self, text: impl Into<String>) -> bool {
        let transport = self.inner.read().transport.clone();
        let Some(transport) = transport else {
            warn!("Send skipped - not connected");
            return false;
        };
        if transport.is_closed() {
            warn!("Send skipped - outbound queue closed");
            return false;
        }

        match transport.send_text(text.into()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Send failed");
                false
            }
        }
    }

    /// Register `symbol` on the real-time trade channel.
    pub fn subscribe(&self, symbol: &str) -> bool {
        info!(symbol, "Subscribing");
        self.send(build_register(symbol))
    }

    /// Remove `symbol` from the real-time trade channel.
    pub fn unsubscribe(&self, symbol: &str) -> bool {
        info!(symbol, "Unsubscribing");
        self.send(build_unregister(symbol))
    }

    /// Close the current connection, if any.
    ///
    /// The driver sends a Close frame and the session ends up `Closed`.
    /// Login or token fetches already in flight are not interrupted.
    pub fn close(&self) {
        let inner = self.inner.read();
        info!(state = %inner.state, "Session close requested");
        inner.cancel.cancel();
    }

    // ------------------------------------------------------------------
    // Transport callbacks
    // ------------------------------------------------------------------

    /// Disconnected | Closed → Connecting. Returns the cycle's cancel token.
    pub(crate) fn begin_connect(&self) -> WsResult<CancellationToken> {
        let mut inner = self.inner.write();
        match inner.state {
            SessionState::Disconnected | SessionState::Closed => {}
            other => return Err(WsError::InvalidState(other)),
        }
        inner.cancel = CancellationToken::new();
        self.transition(&mut inner, SessionState::Connecting);
        Ok(inner.cancel.clone())
    }

    /// Connecting → AwaitingLogin, then send the LOGIN frame.
    ///
    /// The token fetch runs inline: the driver reads no inbound frame until
    /// this returns, so the upstream always sees LOGIN first.
    pub(crate) async fn on_open(&self, transport: Arc<dyn FrameSender>) -> WsResult<()> {
        info!("WebSocket opened");
        {
            let mut inner = self.inner.write();
            inner.transport = Some(transport.clone());
            self.transition(&mut inner, SessionState::AwaitingLogin);
        }

        let token = self.tokens.access_token().await?;
        transport.send_text(login_frame(&token))?;
        info!("Login frame sent");
        Ok(())
    }

    /// Handle one inbound text frame completely.
    pub(crate) async fn on_text(&self, raw: &str) -> FrameOutcome {
        debug!(recv = raw, "Frame received");

        let kind = classify(raw);
        let (state, transport) = {
            let inner = self.inner.read();
            (inner.state, inner.transport.clone())
        };

        match (kind, state) {
            (FrameKind::Heartbeat, _) => self.echo_heartbeat(transport.as_deref(), raw),

            (FrameKind::LoginResult { success: true }, SessionState::AwaitingLogin) => {
                let mut inner = self.inner.write();
                self.transition(&mut inner, SessionState::Authenticated);
                info!("Login accepted");
                FrameOutcome::LoggedIn
            }

            (FrameKind::LoginResult { success: false }, SessionState::AwaitingLogin) => {
                SessionStats::bump(&self.stats.login_rejections);
                warn!(frame = raw, "Login rejected");
                FrameOutcome::LoginRejected
            }

            (FrameKind::Data, SessionState::Authenticated) => match self.decoder.decode(raw) {
                Some(decoded) => {
                    SessionStats::bump(&self.stats.quotes_published);
                    self.sink.publish(decoded);
                    FrameOutcome::Published
                }
                None => {
                    SessionStats::bump(&self.stats.decode_misses);
                    debug!("Data frame decoded to nothing");
                    FrameOutcome::DecodeMiss
                }
            },

            (kind, state) => {
                SessionStats::bump(&self.stats.frames_dropped);
                if state == SessionState::Authenticated {
                    warn!(?kind, "Unexpected LOGIN result while authenticated");
                } else {
                    debug!(?kind, %state, "Frame dropped");
                }
                FrameOutcome::Dropped
            }
        }
    }

    /// Server or client closed the connection.
    pub(crate) fn on_close(&self, code: u16, reason: &str) {
        warn!(code, reason, "WebSocket closed");
        self.detach();
    }

    /// Unrecoverable transport error.
    pub(crate) fn on_error(&self, err: &WsError) {
        error!(error = %err, "WebSocket error");
        self.detach();
    }

    fn echo_heartbeat(&self, transport: Option<&dyn FrameSender>, raw: &str) -> FrameOutcome {
        let Some(transport) = transport else {
            SessionStats::bump(&self.stats.frames_dropped);
            return FrameOutcome::Dropped;
        };
        match transport.send_text(raw.to_string()) {
            Ok(()) => {
                SessionStats::bump(&self.stats.heartbeats_echoed);
                debug!("Ping echoed");
                FrameOutcome::HeartbeatEchoed
            }
            Err(e) => {
                SessionStats::bump(&self.stats.frames_dropped);
                warn!(error = %e, "Ping echo failed");
                FrameOutcome::Dropped
            }
        }
    }

    fn detach(&self) {
        let mut inner = self.inner.write();
        inner.transport = None;
        self.transition(&mut inner, SessionState::Closed);
    }

    fn transition(&self, inner: &mut Inner, next: SessionState) {
        if inner.state != next {
            debug!(from = %inner.state, to = %next, "Session state change");
            inner.state = next;
            self.state_tx.send_replace(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwoom_auth::AuthError;
    use parking_lot::Mutex;

    const LOGIN_OK: &str = r#"{"trnm":"LOGIN","return_code":0,"return_msg":""}"#;
    const LOGIN_FAIL: &str = r#"{"trnm":"LOGIN","return_code":100013,"return_msg":"bad token"}"#;
    const PING: &str = r#"{"trnm":"PING","id":"x"}"#;
    const REAL: &str = r#"{"trnm":"REAL","data":[{"type":"0B","item":"005930","values":{}}]}"#;
    const REG_ACK: &str = r#"{"trnm":"REG","return_code":0}"#;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<String>>,
        closed: bool,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    impl FrameSender for RecordingSender {
        fn send_text(&self, text: String) -> WsResult<()> {
            self.sent.lock().push(text);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    #[derive(Default)]
    struct StubTokens {
        fail: bool,
        calls: AtomicU64,
    }

    impl TokenSource for StubTokens {
        fn access_token(&self) -> BoxFuture<'_, AuthResult<String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    Err(AuthError::MissingToken {
                        code: Some(3),
                        msg: None,
                    })
                } else {
                    Ok("tok".to_string())
                }
            })
        }
    }

    /// Decodes REAL frames into the raw string, counting every call.
    #[derive(Default)]
    struct CountingDecoder {
        calls: AtomicU64,
    }

    impl FrameDecoder for CountingDecoder {
        type Output = String;

        fn decode(&self, raw: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            raw.contains(r#""trnm":"REAL""#).then(|| raw.to_string())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        items: Mutex<Vec<String>>,
    }

    impl QuoteSink<String> for CollectingSink {
        fn publish(&self, item: String) {
            self.items.lock().push(item);
        }
    }

    type TestSession = StreamingSession<CountingDecoder, CollectingSink>;

    fn session_with(tokens: StubTokens) -> (TestSession, Arc<StubTokens>) {
        let tokens = Arc::new(tokens);
        let session = StreamingSession::new(
            SessionConfig::default(),
            tokens.clone(),
            CountingDecoder::default(),
            CollectingSink::default(),
        );
        (session, tokens)
    }

    async fn opened(session: &TestSession) -> Arc<RecordingSender> {
        let sender = Arc::new(RecordingSender::default());
        session.begin_connect().unwrap();
        session.on_open(sender.clone()).await.unwrap();
        sender
    }

    #[test]
    fn test_initial_state_and_send_without_transport() {
        let (session, _) = session_with(StubTokens::default());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.send("hello"));
        assert!(!session.subscribe("005930"));
    }

    #[tokio::test]
    async fn test_login_handshake_and_heartbeat() {
        let (session, tokens) = session_with(StubTokens::default());

        session.begin_connect().unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        let sender = Arc::new(RecordingSender::default());
        session.on_open(sender.clone()).await.unwrap();
        assert_eq!(session.state(), SessionState::AwaitingLogin);
        assert_eq!(sender.sent(), vec![r#"{"trnm":"LOGIN","token":"tok"}"#.to_string()]);
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);

        assert_eq!(session.on_text(LOGIN_OK).await, FrameOutcome::LoggedIn);
        assert_eq!(session.state(), SessionState::Authenticated);
        assert!(session.is_authenticated());

        assert_eq!(session.on_text(PING).await, FrameOutcome::HeartbeatEchoed);
        assert_eq!(sender.sent().last().map(String::as_str), Some(PING));
        assert_eq!(session.stats().heartbeats_echoed(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_echoed_before_login() {
        let (session, _) = session_with(StubTokens::default());
        let sender = opened(&session).await;

        assert_eq!(session.on_text(PING).await, FrameOutcome::HeartbeatEchoed);
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.sent()[1], PING);
        assert_eq!(session.state(), SessionState::AwaitingLogin);
    }

    #[tokio::test]
    async fn test_data_before_login_is_dropped() {
        let (session, _) = session_with(StubTokens::default());
        let _sender = opened(&session).await;

        assert_eq!(session.on_text(REAL).await, FrameOutcome::Dropped);
        assert_eq!(session.decoder.calls.load(Ordering::SeqCst), 0);
        assert!(session.sink.items.lock().is_empty());
        assert_eq!(session.stats().frames_dropped(), 1);
    }

    #[tokio::test]
    async fn test_data_after_login_is_published_once() {
        let (session, _) = session_with(StubTokens::default());
        let _sender = opened(&session).await;
        session.on_text(LOGIN_OK).await;

        assert_eq!(session.on_text(REAL).await, FrameOutcome::Published);
        assert_eq!(session.decoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.sink.items.lock().as_slice(), [REAL.to_string()]);
        assert_eq!(session.stats().quotes_published(), 1);
    }

    #[tokio::test]
    async fn test_decode_miss_publishes_nothing() {
        let (session, _) = session_with(StubTokens::default());
        let _sender = opened(&session).await;
        session.on_text(LOGIN_OK).await;

        assert_eq!(session.on_text(REG_ACK).await, FrameOutcome::DecodeMiss);
        assert_eq!(session.decoder.calls.load(Ordering::SeqCst), 1);
        assert!(session.sink.items.lock().is_empty());
        assert_eq!(session.stats().decode_misses(), 1);
    }

    #[tokio::test]
    async fn test_login_rejected_stays_awaiting() {
        let (session, tokens) = session_with(StubTokens::default());
        let sender = opened(&session).await;

        assert_eq!(session.on_text(LOGIN_FAIL).await, FrameOutcome::LoginRejected);
        assert_eq!(session.state(), SessionState::AwaitingLogin);
        assert_eq!(session.stats().login_rejections(), 1);
        // No new token is requested and no login is retried.
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sender.sent().len(), 1);

        // A later success still completes the login.
        assert_eq!(session.on_text(LOGIN_OK).await, FrameOutcome::LoggedIn);
    }

    /// Issuer handing out `tok-<n>`, valid until 2099.
    #[derive(Default)]
    struct SequenceIssuer {
        calls: AtomicU64,
    }

    impl TokenIssuer for SequenceIssuer {
        fn issue(&self) -> BoxFuture<'_, AuthResult<kiwoom_auth::TokenResponse>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(kiwoom_auth::TokenResponse {
                    return_code: Some(0),
                    token: Some(format!("tok-{n}")),
                    expires_dt: Some("20991231235959".to_string()),
                    ..Default::default()
                })
            })
        }
    }

    #[tokio::test]
    async fn test_login_rejected_keeps_shared_credential() {
        let issuer = Arc::new(SequenceIssuer::default());
        let authority = Arc::new(TokenAuthority::new(issuer.clone()));
        let session = StreamingSession::new(
            SessionConfig::default(),
            authority.clone(),
            CountingDecoder::default(),
            CollectingSink::default(),
        );
        let sender = Arc::new(RecordingSender::default());
        session.begin_connect().unwrap();
        session.on_open(sender.clone()).await.unwrap();
        assert_eq!(sender.sent()[0], r#"{"trnm":"LOGIN","token":"tok-1"}"#);

        assert_eq!(session.on_text(LOGIN_FAIL).await, FrameOutcome::LoginRejected);

        // Other holders of the authority still get the cached token.
        assert_eq!(authority.get_access_token().await.unwrap(), "tok-1");
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_queue_is_skipped() {
        let (session, _) = session_with(StubTokens::default());
        let sender = Arc::new(RecordingSender {
            closed: true,
            ..Default::default()
        });
        session.begin_connect().unwrap();
        session.on_open(sender.clone()).await.unwrap();
        let login_only = sender.sent();

        assert!(!session.subscribe("005930"));
        assert!(!session.send("hello"));
        assert_eq!(sender.sent(), login_only);
    }

    #[tokio::test]
    async fn test_login_result_after_auth_is_ignored() {
        let (session, _) = session_with(StubTokens::default());
        let _sender = opened(&session).await;
        session.on_text(LOGIN_OK).await;

        assert_eq!(session.on_text(LOGIN_FAIL).await, FrameOutcome::Dropped);
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.decoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.stats().frames_dropped(), 1);
        assert_eq!(session.stats().login_rejections(), 0);
    }

    #[tokio::test]
    async fn test_token_failure_fails_open() {
        let (session, _) = session_with(StubTokens {
            fail: true,
            ..Default::default()
        });
        let sender = Arc::new(RecordingSender::default());
        session.begin_connect().unwrap();

        let err = session.on_open(sender.clone()).await.unwrap_err();
        assert!(matches!(err, WsError::Auth(_)));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejected_while_active() {
        let (session, _) = session_with(StubTokens::default());
        let _sender = opened(&session).await;

        let err = session.begin_connect().unwrap_err();
        assert!(matches!(err, WsError::InvalidState(SessionState::AwaitingLogin)));
        assert_eq!(session.state(), SessionState::AwaitingLogin);
    }

    #[tokio::test]
    async fn test_close_detaches_and_allows_new_cycle() {
        let (session, _) = session_with(StubTokens::default());
        let sender = opened(&session).await;
        session.on_text(LOGIN_OK).await;

        session.on_close(1000, "bye");
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.subscribe("005930"));
        assert_eq!(sender.sent().len(), 1);

        tokio_test::assert_ok!(session.begin_connect());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_error_closes_session() {
        let (session, _) = session_with(StubTokens::default());
        let _sender = opened(&session).await;

        session.on_error(&WsError::ConnectionFailed("reset".to_string()));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.on_text(REAL).await, FrameOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_subscribe_sends_register_frame() {
        let (session, _) = session_with(StubTokens::default());
        let sender = opened(&session).await;
        session.on_text(LOGIN_OK).await;

        assert!(session.subscribe("005930"));
        assert!(session.unsubscribe("005930"));
        let sent = sender.sent();
        assert_eq!(sent[1], build_register("005930"));
        assert_eq!(sent[2], build_unregister("005930"));
    }

    #[tokio::test]
    async fn test_watch_state_observes_transitions() {
        let (session, _) = session_with(StubTokens::default());
        let mut rx = session.watch_state();
        assert_eq!(*rx.borrow(), SessionState::Disconnected);

        let _sender = opened(&session).await;
        session.on_text(LOGIN_OK).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Authenticated);
    }
}
