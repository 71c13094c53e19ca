//! Live trade feed over websocket.
//!
//! Connects to the Finnhub streaming endpoint, subscribes to the watched
//! symbols, and forwards each trade batch to the table applier. The
//! connection runs a simple lifecycle: DISCONNECTED → CONNECTING → OPEN,
//! then back through CLOSED or ERROR into a fixed reconnect delay. The
//! driver task never gives up on its own; only cancellation ends it.
//!
//! Subscription changes arrive as commands from the engine. The feed keeps
//! its own set of subscribed symbols so a fresh connection can re-subscribe
//! everything after a reconnect.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use urlencoding::encode;

use crate::models::{Symbol, TradeTick};
use crate::provider::finnhub::WS_URL;

/// Delay between a lost connection and the next connect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle, observable through [`FeedHandle::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Error,
}

/// Subscription change requested by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedCommand {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
}

/// Cheap handle for talking to a running feed.
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<FeedCommand>,
    state: watch::Receiver<FeedState>,
}

impl FeedHandle {
    /// Ask the feed to subscribe `symbol`. Applied on the live connection
    /// when there is one, otherwise on the next reconnect.
    pub fn subscribe(&self, symbol: impl Into<Symbol>) {
        let _ = self.commands.send(FeedCommand::Subscribe(symbol.into()));
    }

    /// Ask the feed to drop `symbol`.
    pub fn unsubscribe(&self, symbol: impl Into<Symbol>) {
        let _ = self.commands.send(FeedCommand::Unsubscribe(symbol.into()));
    }

    /// Current connection state.
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    /// Receiver for observing state transitions.
    pub fn state_changes(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }
}

/// Websocket driver. Owns the connection lifecycle; trade batches go out
/// through the tick channel, already parsed but not yet last-wins reduced.
pub struct LiveFeed {
    url: String,
    symbols: Vec<Symbol>,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    ticks: mpsc::UnboundedSender<Vec<TradeTick>>,
    state: watch::Sender<FeedState>,
    cancel: CancellationToken,
}

impl LiveFeed {
    /// Create a feed for the streaming endpoint, seeded with the symbols to
    /// subscribe once the connection opens.
    pub fn new(
        api_key: &str,
        symbols: Vec<Symbol>,
        ticks: mpsc::UnboundedSender<Vec<TradeTick>>,
        cancel: CancellationToken,
    ) -> (Self, FeedHandle) {
        let url = format!("{}?token={}", WS_URL, encode(api_key));
        Self::with_url(url, symbols, ticks, cancel)
    }

    fn with_url(
        url: String,
        symbols: Vec<Symbol>,
        ticks: mpsc::UnboundedSender<Vec<TradeTick>>,
        cancel: CancellationToken,
    ) -> (Self, FeedHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(FeedState::Disconnected);

        let feed = Self {
            url,
            symbols,
            commands: command_rx,
            ticks,
            state: state_tx,
            cancel,
        };
        let handle = FeedHandle {
            commands: command_tx,
            state: state_rx,
        };
        (feed, handle)
    }

    /// Drive the connection until cancelled. Reconnects after
    /// [`RECONNECT_DELAY`] whenever the connection closes or errors.
    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.send_replace(FeedState::Connecting);
            let outcome = match connect_async(self.url.as_str()).await {
                Ok((socket, _response)) => {
                    info!("Trade feed connected");
                    self.drive(socket).await
                }
                Err(err) => {
                    warn!("Trade feed connect failed: {}", err);
                    FeedState::Error
                }
            };

            if outcome == FeedState::Disconnected {
                break;
            }
            self.state.send_replace(outcome);
            debug!("Trade feed lost ({:?}), reconnecting in {:?}", outcome, RECONNECT_DELAY);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        self.state.send_replace(FeedState::Disconnected);
    }

    /// Run one live connection to completion. Returns the state the
    /// connection ended in; `Disconnected` means an orderly shutdown.
    async fn drive(&mut self, socket: WsStream) -> FeedState {
        let (mut write, mut read) = socket.split();

        for symbol in &self.symbols {
            let message = control_message("subscribe", symbol);
            if write.send(Message::Text(message)).await.is_err() {
                return FeedState::Error;
            }
        }
        self.state.send_replace(FeedState::Open);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return FeedState::Disconnected;
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone; no one can steer the feed.
                        let _ = write.send(Message::Close(None)).await;
                        return FeedState::Disconnected;
                    };
                    self.track(&command);
                    let message = match &command {
                        FeedCommand::Subscribe(symbol) => control_message("subscribe", symbol),
                        FeedCommand::Unsubscribe(symbol) => control_message("unsubscribe", symbol),
                    };
                    if write.send(Message::Text(message)).await.is_err() {
                        return FeedState::Error;
                    }
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(ticks) = parse_trades(&text) {
                                if !ticks.is_empty() && self.ticks.send(ticks).is_err() {
                                    // Applier is gone, streaming is pointless.
                                    let _ = write.send(Message::Close(None)).await;
                                    return FeedState::Disconnected;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if write.send(Message::Pong(payload)).await.is_err() {
                                return FeedState::Error;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return FeedState::Closed,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!("Trade feed read failed: {}", err);
                            return FeedState::Error;
                        }
                    }
                }
            }
        }
    }

    /// Keep the resubscription set in step with the requested changes.
    fn track(&mut self, command: &FeedCommand) {
        match command {
            FeedCommand::Subscribe(symbol) => {
                if !self.symbols.iter().any(|s| s == symbol) {
                    self.symbols.push(symbol.clone());
                }
            }
            FeedCommand::Unsubscribe(symbol) => {
                self.symbols.retain(|s| s != symbol);
            }
        }
    }
}

fn control_message(action: &str, symbol: &str) -> String {
    json!({"type": action, "symbol": symbol}).to_string()
}

/// Streamed message envelope; only trade batches carry data we use.
#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Vec<TradeTick>,
}

/// Extract the trade batch from one text frame. Anything that is not a
/// well-formed trade message (pings, acks, junk) is `None`.
fn parse_trades(text: &str) -> Option<Vec<TradeTick>> {
    let message: FeedMessage = serde_json::from_str(text).ok()?;
    if message.kind.as_deref() != Some("trade") {
        return None;
    }
    Some(message.data)
}

// ============================================================================
// Tests
// ============================================================================
