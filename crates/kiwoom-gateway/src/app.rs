//! Main application orchestration.
//!
//! Coordinates:
//! - Token authority (shared by login and `--check-token`)
//! - One streaming session cycle
//! - Symbol registration after login
//! - Quote consumption

use crate::config::AppConfig;
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use kiwoom_auth::{AuthClient, TokenAuthority};
use kiwoom_feed::{BroadcastSink, Quote, RealDataParser};
use kiwoom_ws::{SessionState, StreamingSession};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type GatewaySession = StreamingSession<RealDataParser, BroadcastSink>;

/// Main application.
pub struct Application {
    config: AppConfig,
    authority: Arc<TokenAuthority<AuthClient>>,
    session: Arc<GatewaySession>,
    sink: BroadcastSink,
}

impl Application {
    /// Create a new application. Fails on invalid config.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let client = AuthClient::new(config.auth_config())?;
        let authority = Arc::new(TokenAuthority::new(client));
        let sink = BroadcastSink::new(config.stream.quote_buffer);
        let session = Arc::new(StreamingSession::new(
            config.session_config(),
            authority.clone(),
            RealDataParser::new(),
            sink.clone(),
        ));

        Ok(Self {
            config,
            authority,
            session,
            sink,
        })
    }

    pub fn session(&self) -> &Arc<GatewaySession> {
        &self.session
    }

    /// Receiver for decoded quotes.
    pub fn quotes(&self) -> broadcast::Receiver<Quote> {
        self.sink.subscribe()
    }

    /// Issue (or reuse) a token and return its expiry.
    pub async fn check_token(&self) -> AppResult<Option<DateTime<Utc>>> {
        self.authority.get_access_token().await?;
        Ok(self.authority.expires_at().await)
    }

    /// Run one connection cycle until the upstream closes or Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let symbols = self.config.symbols();
        info!(symbols = ?symbols, url = %self.config.stream.ws_url, "Starting gateway");

        let subscribe_handle = spawn_subscriber(self.session.clone(), symbols);
        let quote_handle = spawn_quote_logger(self.sink.subscribe());

        let shutdown_session = self.session.clone();
        let shutdown_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    shutdown_session.close();
                }
                Err(e) => error!(?e, "Failed to listen for shutdown signal"),
            }
        });

        let result = self.session.connect().await;

        shutdown_handle.abort();
        subscribe_handle.abort();
        quote_handle.abort();

        let stats = self.session.stats();
        info!(
            heartbeats = stats.heartbeats_echoed(),
            published = stats.quotes_published(),
            decode_misses = stats.decode_misses(),
            dropped = stats.frames_dropped(),
            login_rejections = stats.login_rejections(),
            "Session cycle finished"
        );

        result.map_err(Box::new)?;
        Ok(())
    }
}

/// Register every symbol once the session authenticates.
///
/// Gives up if the cycle closes first. Returns how many were queued.
fn spawn_subscriber(session: Arc<GatewaySession>, symbols: Vec<String>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut state_rx = session.watch_state();
        let reached = state_rx
            .wait_for(|s| matches!(s, SessionState::Authenticated | SessionState::Closed))
            .await
            .map(|s| *s);

        if !matches!(reached, Ok(SessionState::Authenticated)) {
            warn!("Session closed before login, skipping subscriptions");
            return 0;
        }

        let queued = symbols.iter().filter(|s| session.subscribe(s)).count();
        info!(queued, total = symbols.len(), "Subscriptions sent");
        queued
    })
}

fn spawn_quote_logger(mut rx: broadcast::Receiver<Quote>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(quote) => debug!(
                    symbol = %quote.symbol,
                    price = %quote.price,
                    volume = quote.volume,
                    trade_time = %quote.trade_time,
                    "Quote"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Quote logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
