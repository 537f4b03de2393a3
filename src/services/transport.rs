//! Transport seam between the session channel and the network.

use std::time::Duration;

use futures::{SinkExt, StreamExt, future::BoxFuture};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{Interval, MissedTickBehavior, interval},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::services::stomp::{StompError, StompFrame, decode_frames};

/// Errors raised by a transport link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing the connection failed.
    #[error("connection to `{url}` failed: {message}")]
    Connect { url: String, message: String },
    /// The peer sent something that is not a valid STOMP frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] StompError),
    /// The peer answered with a STOMP ERROR frame.
    #[error("server error: {0}")]
    Server(String),
    /// The link closed.
    #[error("connection closed")]
    Closed,
    /// No answer arrived in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// An established bidirectional frame link.
pub struct StompLink {
    /// Frames to send to the server.
    pub outbound: mpsc::UnboundedSender<StompFrame>,
    /// Frames received from the server; the channel closes with the link.
    pub inbound: mpsc::UnboundedReceiver<Result<StompFrame, TransportError>>,
}

/// Opens links to the session server.
pub trait Connector: Send + Sync {
    /// Establish a fresh link.
    fn connect(&self) -> BoxFuture<'static, Result<StompLink, TransportError>>;
}

/// [`Connector`] speaking STOMP over a WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    heartbeat: Duration,
}

impl WebSocketConnector {
    /// Connector for the WebSocket endpoint at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: Duration::ZERO,
        }
    }

    /// Send a heart-beat newline every `interval`; zero disables it.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'static, Result<StompLink, TransportError>> {
        let url = self.url.clone();
        let heartbeat = self.heartbeat;
        Box::pin(async move {
            let (socket, _response) =
                connect_async(url.as_str())
                    .await
                    .map_err(|err| TransportError::Connect {
                        url: url.clone(),
                        message: err.to_string(),
                    })?;
            let (mut sink, mut stream) = socket.split();
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<StompFrame>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

            // Writer task: drains queued frames until the channel or the socket closes.
            tokio::spawn(async move {
                let mut ticker = (!heartbeat.is_zero()).then(|| {
                    let mut ticker = interval(heartbeat);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker
                });
                loop {
                    let text = tokio::select! {
                        frame = outbound_rx.recv() => match frame {
                            Some(frame) => frame.encode(),
                            None => break,
                        },
                        _ = tick(ticker.as_mut()) => "\n".to_string(),
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            // Reader task: decodes text messages into frames.
            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    let text = match message {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text.into(),
                            Err(err) => {
                                warn!(error = %err, "dropping non UTF-8 binary message");
                                continue;
                            }
                        },
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "websocket closed by server");
                            break;
                        }
                        Ok(_) => continue,
                        Err(err) => {
                            warn!(error = %err, "websocket read error");
                            break;
                        }
                    };

                    match decode_frames(text.as_str()) {
                        Ok(frames) => {
                            for frame in frames {
                                if inbound_tx.send(Ok(frame)).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            if inbound_tx.send(Err(err.into())).is_err() {
                                return;
                            }
                        }
                    }
                }
            });

            Ok(StompLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
