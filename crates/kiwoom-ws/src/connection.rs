//! WebSocket connection driver.
//!
//! Runs exactly one connection cycle for a [`StreamingSession`]: open the
//! socket, drive the login handshake, then pump frames until the socket
//! closes, errors, or the session is closed. Reconnecting is the caller's
//! job; call [`StreamingSession::connect`] again once it returns.

use crate::error::{WsError, WsResult};
use crate::session::{FrameDecoder, QuoteSink, StreamingSession};
use crate::transport::ChannelSender;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tracing::{debug, info, warn};

/// Production WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.kiwoom.com:10000/api/dostk/websocket";

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Outbound frames that may be queued before `send` starts failing.
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            outbound_buffer: 1024,
        }
    }
}

impl<D, S> StreamingSession<D, S>
where
    D: FrameDecoder,
    S: QuoteSink<D::Output>,
{
    /// Connect and run the message loop until the connection ends.
    ///
    /// Returns `Ok(())` when the stream ends or [`close`](Self::close) is
    /// called, and an error for handshake, login-token, transport failures
    /// and server-initiated closes. The session is `Closed` afterwards in
    /// every case except `InvalidState`.
    pub async fn connect(&self) -> WsResult<()> {
        let cancel = self.begin_connect()?;
        info!(url = %self.config().url, "Connecting to WebSocket");

        // TCP_NODELAY: frames are small and latency-sensitive.
        let handshake = connect_async_tls_with_config(self.config().url.as_str(), None, true, None);
        let ws_stream = tokio::select! {
            () = cancel.cancelled() => {
                self.on_close(1000, "closed before open");
                return Ok(());
            }
            result = handshake => match result {
                Ok((ws_stream, _response)) => ws_stream,
                Err(e) => {
                    let err = WsError::from(e);
                    self.on_error(&err);
                    return Err(err);
                }
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<String>(self.config().outbound_buffer.max(1));
        if let Err(e) = self.on_open(Arc::new(ChannelSender::new(outbound_tx))).await {
            self.on_error(&e);
            if let Err(close_err) = write.send(Message::Close(None)).await {
                warn!(?close_err, "Failed to send Close frame after open failure");
            }
            return Err(e);
        }

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("Close requested, shutting down connection");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    self.on_close(1000, "closed by client");
                    return Ok(());
                }

                // Outbound first so LOGIN and echoes leave before the next frame is read.
                outbound = outbound_rx.recv() => {
                    let Some(text) = outbound else {
                        self.on_close(1000, "outbound channel closed");
                        return Ok(());
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let err = WsError::from(e);
                        self.on_error(&err);
                        return Err(err);
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let outcome = self.on_text(&text).await;
                            debug!(?outcome, "Frame handled");
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                let err = WsError::from(e);
                                self.on_error(&err);
                                return Err(err);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            self.on_close(code, &reason);
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let err = WsError::from(e);
                            self.on_error(&err);
                            return Err(err);
                        }
                        None => {
                            self.on_close(1006, "stream ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert_eq!(config.outbound_buffer, 1024);
    }
}
