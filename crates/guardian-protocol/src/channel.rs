//! Realtime control channel: Socket.IO over a WebSocket, with reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use guardian_types::{ChannelEvent, DURATION_EVENT, SESSION_FINISHED_EVENT};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::ProtocolError;
use crate::wire::{decode_packet, encode_packet, integer_arg, Packet, SocketPacket};

/// How long to wait for the server's first packet after the WebSocket opens.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// How long `disconnect` waits for the connection task to say goodbye.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the outbound event queue.
const OUTBOUND_CAPACITY: usize = 16;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The realtime link to the control server.
///
/// Inbound events are delivered through the sender passed to [`connect`];
/// implementations run their network I/O on their own task and only ever
/// touch the consumer through that queue.
///
/// [`connect`]: ControlChannel::connect
#[async_trait]
pub trait ControlChannel: Send + 'static {
    /// Start the connection task. Retries internally; returns immediately.
    async fn connect(&mut self, events: mpsc::Sender<ChannelEvent>) -> Result<(), ProtocolError>;

    /// Announce that a countdown ran out. Best-effort, never blocks.
    fn emit_session_complete(&self);

    /// Stop the connection task, saying goodbye to the server if connected.
    async fn disconnect(&mut self);
}

/// Reconnect and addressing options for [`SocketIoChannel`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Control server base address, e.g. `http://localhost:3000`.
    pub server_url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Socket.IO (Engine.IO v4, WebSocket transport) implementation of [`ControlChannel`].
pub struct SocketIoChannel {
    endpoint: Url,
    options: ChannelOptions,
    connected: Arc<AtomicBool>,
    outbound: Option<mpsc::Sender<SocketPacket>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SocketIoChannel {
    pub fn new(options: ChannelOptions) -> Result<Self, ProtocolError> {
        let endpoint = websocket_endpoint(&options.server_url)?;
        Ok(Self {
            endpoint,
            options,
            connected: Arc::new(AtomicBool::new(false)),
            outbound: None,
            shutdown: None,
            task: None,
        })
    }

    /// The WebSocket URL this channel connects to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether a Socket.IO session is currently established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlChannel for SocketIoChannel {
    async fn connect(&mut self, events: mpsc::Sender<ChannelEvent>) -> Result<(), ProtocolError> {
        if self.task.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = ChannelWorker {
            endpoint: self.endpoint.clone(),
            options: self.options.clone(),
            connected: Arc::clone(&self.connected),
            events,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };

        info!(endpoint = %self.endpoint, "starting realtime channel");
        self.task = Some(tokio::spawn(worker.run()));
        self.outbound = Some(outbound_tx);
        self.shutdown = Some(shutdown_tx);
        Ok(())
    }

    fn emit_session_complete(&self) {
        let Some(outbound) = &self.outbound else {
            warn!("realtime channel never started, dropping {SESSION_FINISHED_EVENT}");
            return;
        };
        if !self.is_connected() {
            warn!("realtime channel offline, dropping {SESSION_FINISHED_EVENT}");
            return;
        }
        match outbound.try_send(SocketPacket::event(SESSION_FINISHED_EVENT, Vec::new())) {
            Ok(()) => debug!("queued {SESSION_FINISHED_EVENT}"),
            Err(e) => warn!(error = %e, "failed to queue {SESSION_FINISHED_EVENT}"),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        self.outbound = None;

        if let Some(mut task) = self.task.take() {
            if timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                debug!("realtime channel did not stop in time, aborting");
                task.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("realtime channel disconnected");
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Build the Engine.IO WebSocket URL from the server's base address.
pub fn websocket_endpoint(server_url: &str) -> Result<Url, ProtocolError> {
    let mut url = Url::parse(server_url)
        .map_err(|e| ProtocolError::InvalidAddress(format!("{server_url}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ProtocolError::InvalidAddress(format!(
                "unsupported scheme {other:?} in {server_url}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ProtocolError::InvalidAddress(format!("cannot use {scheme} for {server_url}")))?;
    url.set_path("/socket.io/");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Why a single WebSocket session ended.
enum SessionEnd {
    /// Shutdown was requested or the consumer went away.
    Stop,
    /// The connection dropped; `joined` tells whether the Socket.IO
    /// handshake had completed.
    Lost { joined: bool, reason: String },
}

/// Owns the network side of the channel; runs on its own task.
struct ChannelWorker {
    endpoint: Url,
    options: ChannelOptions,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<SocketPacket>,
    shutdown: watch::Receiver<bool>,
}

impl ChannelWorker {
    async fn run(mut self) {
        let mut backoff = self.options.initial_backoff;

        loop {
            let attempt = tokio::select! {
                result = connect_async(self.endpoint.as_str()) => result,
                _ = self.shutdown.changed() => return,
            };

            match attempt {
                Ok((ws, _response)) => {
                    debug!(endpoint = %self.endpoint, "websocket open");
                    match self.drive(ws).await {
                        SessionEnd::Stop => return,
                        SessionEnd::Lost { joined, reason } => {
                            if joined {
                                backoff = self.options.initial_backoff;
                                self.connected.store(false, Ordering::SeqCst);
                                if self.events.send(ChannelEvent::Disconnected).await.is_err() {
                                    return;
                                }
                            }
                            warn!(reason = %reason, "realtime channel lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "failed to connect to control server");
                }
            }

            debug!(?backoff, "reconnecting after backoff");
            tokio::select! {
                () = sleep(backoff) => {}
                _ = self.shutdown.changed() => return,
            }
            backoff = next_backoff(backoff, self.options.max_backoff);
        }
    }

    /// Run one WebSocket session until it drops or shutdown is requested.
    async fn drive(&mut self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        let mut joined = false;
        let mut deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        // Ping interval + ping timeout, learned from the open packet.
        let mut liveness_window = HANDSHAKE_TIMEOUT;

        loop {
            let reply = tokio::select! {
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Lost { joined, reason: "closed by server".to_string() };
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            return SessionEnd::Lost { joined, reason: e.to_string() };
                        }
                    };
                    deadline = Instant::now() + liveness_window;
                    trace!(frame = %text, "received frame");

                    let packet = match decode_packet(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!(error = %e, "ignoring malformed packet");
                            continue;
                        }
                    };

                    match packet {
                        Packet::Open(handshake) => {
                            liveness_window = Duration::from_millis(
                                handshake.ping_interval.saturating_add(handshake.ping_timeout),
                            );
                            deadline = Instant::now() + liveness_window;
                            debug!(sid = %handshake.sid, "engine.io session open");
                            Some(Packet::Message(SocketPacket::connect()))
                        }
                        Packet::Ping(data) => Some(Packet::Pong(data)),
                        Packet::Close => {
                            return SessionEnd::Lost { joined, reason: "engine.io close".to_string() };
                        }
                        Packet::Message(SocketPacket::Connect { .. }) => {
                            joined = true;
                            self.connected.store(true, Ordering::SeqCst);
                            info!("connected to control server");
                            if self.events.send(ChannelEvent::Connected).await.is_err() {
                                return SessionEnd::Stop;
                            }
                            None
                        }
                        Packet::Message(SocketPacket::ConnectError { message, .. }) => {
                            return SessionEnd::Lost { joined, reason: format!("connect refused: {message}") };
                        }
                        Packet::Message(SocketPacket::Disconnect { .. }) => {
                            return SessionEnd::Lost { joined, reason: "disconnected by server".to_string() };
                        }
                        Packet::Message(SocketPacket::Event { name, args, .. }) => {
                            if self.dispatch(&name, &args).await.is_err() {
                                return SessionEnd::Stop;
                            }
                            None
                        }
                        Packet::Message(SocketPacket::Ack { .. })
                        | Packet::Pong(_)
                        | Packet::Upgrade
                        | Packet::Noop => None,
                    }
                }
                Some(packet) = self.outbound.recv(), if joined => {
                    Some(Packet::Message(packet))
                }
                () = sleep_until(deadline) => {
                    return SessionEnd::Lost { joined, reason: "server stopped responding".to_string() };
                }
                _ = self.shutdown.changed() => {
                    if joined {
                        if let Ok(text) = encode_packet(&Packet::Message(SocketPacket::disconnect())) {
                            let _ = sink.send(Message::Text(text)).await;
                        }
                    }
                    let _ = sink.close().await;
                    self.connected.store(false, Ordering::SeqCst);
                    return SessionEnd::Stop;
                }
            };

            if let Some(packet) = reply {
                let text = match encode_packet(&packet) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode packet");
                        continue;
                    }
                };
                trace!(frame = %text, "sending frame");
                if let Err(e) = sink.send(Message::Text(text)).await {
                    return SessionEnd::Lost { joined, reason: e.to_string() };
                }
            }
        }
    }

    /// Hand an inbound event to the consumer. Errors only when the consumer is gone.
    async fn dispatch(
        &self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<(), mpsc::error::SendError<ChannelEvent>> {
        if name != DURATION_EVENT {
            debug!(event = %name, "ignoring unsubscribed event");
            return Ok(());
        }
        match args.first().and_then(integer_arg) {
            Some(seconds) => {
                info!(seconds, "duration received");
                self.events.send(ChannelEvent::DurationReceived(seconds)).await
            }
            None => {
                warn!(?args, "ignoring {DURATION_EVENT} without an integer payload");
                Ok(())
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_from_http_base() {
        let url = websocket_endpoint("http://localhost:3000").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn endpoint_from_https_base_drops_path_and_query() {
        let url = websocket_endpoint("https://control.example.com/admin?x=1").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://control.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn endpoint_rejects_other_schemes() {
        assert!(websocket_endpoint("ftp://localhost").is_err());
        assert!(websocket_endpoint("not a url").is_err());
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let max = Duration::from_secs(5);
        assert_eq!(next_backoff(Duration::from_secs(1), max), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(4), max), max);
        assert_eq!(next_backoff(max, max), max);
    }

    #[tokio::test]
    async fn emit_before_connect_is_dropped() {
        let channel = SocketIoChannel::new(ChannelOptions::default()).unwrap();
        assert!(!channel.is_connected());
        // Must not panic or block.
        channel.emit_session_complete();
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_noop() {
        let mut channel = SocketIoChannel::new(ChannelOptions::default()).unwrap();
        channel.disconnect().await;
        assert!(!channel.is_connected());
    }
}
