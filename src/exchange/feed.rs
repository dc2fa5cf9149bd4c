//! Push-event feed over the venue's Centrifugo WebSocket
//!
//! Connects with the private JWT, subscribes to the market and account
//! channels and turns every publication into an `EventEnvelope`.
//!
//! Envelopes are handed to the watchdog through a bounded queue with
//! `try_send`, so the socket read loop never waits on a slow consumer. When the
//! queue is full the newest envelope is dropped and counted.
//!
//! Uses exponential backoff for reconnection.

use anyhow::{anyhow, bail, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::types::EventEnvelope;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 30;

/// Channels for one market and one profile
pub fn channels_for(market_id: &str, profile_id: u64) -> Vec<String> {
    vec![
        format!("market:{}", market_id),
        format!("orderbook:{}", market_id),
        format!("trade:{}", market_id),
        format!("account@{}", profile_id),
    ]
}

// ======================= PROTOCOL =======================

#[derive(Debug, Deserialize)]
struct ServerMessage {
    id: Option<u64>,
    error: Option<ReplyError>,
    push: Option<Push>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Push {
    channel: String,
    #[serde(rename = "pub")]
    publication: Option<Publication>,
}

#[derive(Debug, Deserialize)]
struct Publication {
    data: serde_json::Value,
}

/// One decoded server message
#[derive(Debug)]
pub enum Inbound {
    /// Empty object: the server's ping, answered with an empty object
    Ping,
    Publication(EventEnvelope),
    Reply { id: u64, error: Option<String> },
    Other,
}

/// Decode a text frame. The server may batch several JSON messages into one
/// frame separated by newlines.
pub fn parse_frame(text: &str) -> Vec<Inbound> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line == "{}" {
                return Inbound::Ping;
            }
            match serde_json::from_str::<ServerMessage>(line) {
                Ok(ServerMessage { push: Some(push), .. }) => match push.publication {
                    Some(publication) => Inbound::Publication(EventEnvelope::new(
                        push.channel,
                        publication.data.to_string().into_bytes(),
                    )),
                    None => Inbound::Other,
                },
                Ok(ServerMessage { id: Some(id), error, .. }) => Inbound::Reply {
                    id,
                    error: error.map(|e| format!("{} {}", e.code, e.message)),
                },
                Ok(_) => Inbound::Other,
                Err(e) => {
                    debug!("[FEED] Unparseable frame: {} | {}", e, line);
                    Inbound::Other
                }
            }
        })
        .collect()
}

/// Hand an envelope to the consumer without waiting. Returns false once the
/// consumer is gone.
pub fn forward(tx: &mpsc::Sender<EventEnvelope>, envelope: EventEnvelope, dropped: &AtomicU64) -> bool {
    match tx.try_send(envelope) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(envelope)) => {
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(channel = %envelope.channel, dropped = total, "[FEED] Event queue full, dropping envelope");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// ======================= CONNECTION =======================

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reconnection stats
#[derive(Debug, Default)]
pub struct ReconnectStats {
    pub attempts: u32,
    pub last_connect: Option<Instant>,
    pub last_disconnect: Option<Instant>,
    pub total_disconnects: u32,
}

impl ReconnectStats {
    pub fn log(&self) {
        info!("[FEED STATS] disconnects: {} | failed attempts: {} | last connect: {:?} ago | last disconnect: {:?} ago",
            self.total_disconnects, self.attempts,
            self.last_connect.map(|t| t.elapsed()),
            self.last_disconnect.map(|t| t.elapsed()));
    }
}

/// What the session loop does with one socket message
#[derive(Debug, PartialEq)]
pub enum SessionStep {
    Forward(EventEnvelope),
    /// Answer the server; a failed send ends the session
    Reply(Message),
    End(&'static str),
}

/// Turn one socket message into session steps. Both the protocol ping (`{}`)
/// and the transport ping get a reply step so they share one failure path.
pub fn session_steps(msg: Message) -> Vec<SessionStep> {
    match msg {
        Message::Text(text) => parse_frame(&text)
            .into_iter()
            .filter_map(|inbound| match inbound {
                Inbound::Publication(envelope) => Some(SessionStep::Forward(envelope)),
                Inbound::Ping => Some(SessionStep::Reply(Message::Text("{}".to_string()))),
                Inbound::Reply { id, error: Some(err) } => {
                    error!("[FEED] Command {} failed: {}", id, err);
                    None
                }
                Inbound::Reply { id, error: None } => {
                    debug!("[FEED] Command {} acknowledged", id);
                    None
                }
                Inbound::Other => None,
            })
            .collect(),
        Message::Ping(data) => vec![SessionStep::Reply(Message::Pong(data))],
        Message::Close(_) => vec![SessionStep::End("server closed connection")],
        _ => Vec::new(),
    }
}

/// Centrifugo push feed
pub struct CentrifugeFeed {
    ws_url: String,
    token: String,
    channels: Vec<String>,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_stats: Arc<RwLock<ReconnectStats>>,
    dropped: Arc<AtomicU64>,
}

impl CentrifugeFeed {
    pub fn new(ws_url: String, token: String, channels: Vec<String>) -> Self {
        Self {
            ws_url,
            token,
            channels,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_stats: Arc::new(RwLock::new(ReconnectStats::default())),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get connection state
    pub fn state(&self) -> Arc<RwLock<ConnectionState>> {
        self.state.clone()
    }

    /// Disconnect and reconnect counters
    pub fn reconnect_stats(&self) -> Arc<RwLock<ReconnectStats>> {
        self.reconnect_stats.clone()
    }

    /// Envelopes dropped because the consumer queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Connect and subscribe, then keep the feed alive in a background task.
    ///
    /// The first connection is made inline so that a bad URL or token fails
    /// startup. Later disconnects are retried with backoff until `shutdown`
    /// flips to true.
    pub async fn start(
        &self,
        tx: mpsc::Sender<EventEnvelope>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<tokio::task::JoinHandle<()>> {
        *self.state.write().await = ConnectionState::Connecting;
        let first = match Self::connect(&self.ws_url, &self.token, &self.channels).await {
            Ok(ws) => ws,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(e);
            }
        };
        *self.state.write().await = ConnectionState::Connected;
        self.reconnect_stats.write().await.last_connect = Some(Instant::now());

        let ws_url = self.ws_url.clone();
        let token = self.token.clone();
        let channels = self.channels.clone();
        let state = self.state.clone();
        let reconnect_stats = self.reconnect_stats.clone();
        let dropped = self.dropped.clone();

        let handle = tokio::spawn(async move {
            let mut backoff_secs = INITIAL_BACKOFF_SECS;
            let mut ws = Some(first);

            loop {
                if let Some(stream) = ws.take() {
                    let consumer_alive = Self::run_session(stream, &tx, &dropped, &mut shutdown).await;
                    if *shutdown.borrow() || !consumer_alive {
                        break;
                    }

                    // Disconnected - update stats
                    let mut stats = reconnect_stats.write().await;
                    stats.last_disconnect = Some(Instant::now());
                    stats.total_disconnects += 1;
                }
                *state.write().await = ConnectionState::Reconnecting;

                info!("[FEED] Reconnecting in {}s...", backoff_secs);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                    _ = shutdown.changed() => break,
                }

                reconnect_stats.write().await.attempts += 1;
                match Self::connect(&ws_url, &token, &channels).await {
                    Ok(stream) => {
                        *state.write().await = ConnectionState::Connected;
                        let mut stats = reconnect_stats.write().await;
                        stats.last_connect = Some(Instant::now());
                        stats.attempts = 0;
                        backoff_secs = INITIAL_BACKOFF_SECS;
                        ws = Some(stream);
                    }
                    Err(e) => {
                        error!("[FEED] Reconnect failed: {:#}", e);
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    }
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            info!("[FEED] Stopped");
        });

        Ok(handle)
    }

    /// Open the socket, authenticate and subscribe to every channel
    async fn connect(ws_url: &str, token: &str, channels: &[String]) -> Result<WsStream> {
        info!("[FEED] Connecting to {}", ws_url);
        let (mut ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(ws_url))
            .await
            .map_err(|_| anyhow!("connect timed out after {:?}", CONNECT_TIMEOUT))??;

        let connect = json!({ "id": 1, "connect": { "token": token, "name": "order_watchdog" } });
        ws.send(Message::Text(connect.to_string())).await?;
        Self::await_reply(&mut ws, 1).await?;
        info!("[FEED] Connected");

        for (i, channel) in channels.iter().enumerate() {
            let id = i as u64 + 2;
            let subscribe = json!({ "id": id, "subscribe": { "channel": channel } });
            info!("[FEED] Subscribing to channel: {}", channel);
            ws.send(Message::Text(subscribe.to_string())).await?;
        }

        Ok(ws)
    }

    /// Wait for the reply to command `id`, answering pings on the way
    async fn await_reply(ws: &mut WsStream, id: u64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
        loop {
            let msg = tokio::time::timeout_at(deadline, ws.next())
                .await
                .map_err(|_| anyhow!("no reply to command {}", id))?;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    for inbound in parse_frame(&text) {
                        match inbound {
                            Inbound::Reply { id: got, error } if got == id => {
                                if let Some(err) = error {
                                    bail!("command {} rejected: {}", id, err);
                                }
                                return Ok(());
                            }
                            Inbound::Ping => ws.send(Message::Text("{}".to_string())).await?,
                            _ => {}
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => ws.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(frame))) => bail!("server closed connection: {:?}", frame),
                Some(Err(e)) => return Err(e.into()),
                None => bail!("stream ended before reply to command {}", id),
                _ => {}
            }
        }
    }

    /// Read until the socket drops or shutdown. Returns false if the consumer
    /// side of the queue has gone away.
    async fn run_session(
        mut ws: WsStream,
        tx: &mpsc::Sender<EventEnvelope>,
        dropped: &AtomicU64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = ws.close(None).await;
                    return true;
                }
                msg = ws.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            error!("[FEED] Error: {}", e);
                            return true;
                        }
                        None => {
                            warn!("[FEED] Stream ended");
                            return true;
                        }
                    };
                    for step in session_steps(msg) {
                        match step {
                            SessionStep::Forward(envelope) => {
                                if !forward(tx, envelope, dropped) {
                                    warn!("[FEED] Consumer gone, closing feed");
                                    let _ = ws.close(None).await;
                                    return false;
                                }
                            }
                            SessionStep::Reply(reply) => {
                                if let Err(e) = ws.send(reply).await {
                                    warn!("[FEED] Pong failed: {}", e);
                                    return true;
                                }
                            }
                            SessionStep::End(reason) => {
                                warn!("[FEED] Session ended: {}", reason);
                                return true;
                            }
                        }
                    }
                }
            }
        }
    }
}
