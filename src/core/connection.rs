//! Streaming connection lifecycle.
//!
//! A [`Connector`] opens a [`Transport`]; each transport owns one I/O thread
//! that only moves raw text frames over crossbeam channels. The
//! [`ConnectionManager`] holds at most one open link, parses every inbound
//! frame exactly once, and turns transport failures into [`Inbound::Closed`].
//! Reconnection is never automatic.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use log::{debug, error, info, trace, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::error::{PlayerError, PlayerResult};
use super::protocol::{ClientMessage, ServerMessage};

/// Identity of the playback stream endpoint
pub const PLAYBACK_IDENTITY: &str = "playback";
pub const DEFAULT_STREAM_BASE: &str = "ws://127.0.0.1:8000/ws/light/";

/// Poll granularity of the WebSocket I/O thread
const WS_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Who drives the frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Server streams frames after `playback_play`
    #[default]
    Push,
    /// Client requests every frame with `playback_get_frame`
    Pull,
}

/// Raw event from a transport's I/O thread
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Text(String),
    Closed(String),
}

/// Open bidirectional text stream
pub trait Transport: Send {
    fn send(&mut self, msg: &ClientMessage) -> PlayerResult<()>;
    /// Stop the I/O thread; no event is delivered afterwards
    fn close(&mut self);
    fn pacing(&self) -> Pacing;
    fn label(&self) -> &str;
}

/// Opens transports; returns the transport and its inbound event stream
pub trait Connector: Send {
    fn open(&self, identity: &str) -> PlayerResult<(Box<dyn Transport>, Receiver<TransportEvent>)>;
    fn label(&self) -> &str;
}

// ---------------------------------------------------------------------------
// WebSocket transport

/// Opens `ws://.../playback/` style streams with tungstenite
#[derive(Debug, Clone)]
pub struct WsConnector {
    base: String,
    pacing: Pacing,
}

impl WsConnector {
    pub fn new(base: &str) -> Self {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            base,
            pacing: Pacing::Push,
        }
    }

    /// Servers that only answer `playback_get_frame` need pull pacing
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn url_for(&self, identity: &str) -> String {
        if identity == PLAYBACK_IDENTITY {
            format!("{}playback/", self.base)
        } else {
            format!("{}device/{}/", self.base, identity)
        }
    }
}

impl Connector for WsConnector {
    fn open(&self, identity: &str) -> PlayerResult<(Box<dyn Transport>, Receiver<TransportEvent>)> {
        let url = self.url_for(identity);
        info!("Connecting to {}", url);
        let (socket, _resp) =
            tungstenite::connect(url.as_str()).map_err(|e| PlayerError::Transport(format!("{}: {}", url, e)))?;
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream
                .set_read_timeout(Some(WS_READ_TIMEOUT))
                .map_err(|e| PlayerError::Transport(e.to_string()))?;
        }
        let transport = WsTransport::spawn(socket, url, self.pacing)?;
        let events = transport.events.clone();
        Ok((Box::new(transport), events))
    }

    fn label(&self) -> &str {
        "websocket"
    }
}

pub struct WsTransport {
    url: String,
    pacing: Pacing,
    outbound: Sender<String>,
    events: Receiver<TransportEvent>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WsTransport {
    fn spawn(socket: WebSocket<MaybeTlsStream<TcpStream>>, url: String, pacing: Pacing) -> PlayerResult<Self> {
        let (out_tx, out_rx) = unbounded::<String>();
        let (ev_tx, ev_rx) = unbounded::<TransportEvent>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("pxld-ws".into())
            .spawn(move || ws_io_loop(socket, out_rx, ev_tx, flag))
            .map_err(|e| PlayerError::Transport(e.to_string()))?;
        Ok(Self {
            url,
            pacing,
            outbound: out_tx,
            events: ev_rx,
            shutdown,
            thread: Some(thread),
        })
    }
}

fn is_idle(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut
    )
}

/// Socket owner: drain outbound, then read until the timeout says idle
fn ws_io_loop(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    outbound: Receiver<String>,
    events: Sender<TransportEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let reason = loop {
        if shutdown.load(Ordering::Relaxed) {
            let _ = socket.close(None);
            let _ = socket.flush();
            return;
        }

        let mut send_failed = None;
        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::Text(text.into())) {
                        send_failed = Some(format!("send failed: {}", e));
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
            }
        }
        if let Some(reason) = send_failed {
            break reason;
        }

        match socket.read() {
            Ok(Message::Text(t)) => {
                if events.send(TransportEvent::Text(t.as_str().to_owned())).is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                break frame
                    .map(|f| format!("closed by server: {} {}", f.code, f.reason))
                    .unwrap_or_else(|| "closed by server".into());
            }
            Ok(_) => {}
            Err(e) if is_idle(&e) => {}
            Err(e) => break e.to_string(),
        }
    };
    trace!("ws io loop exit: {}", reason);
    let _ = events.send(TransportEvent::Closed(reason));
}

impl Transport for WsTransport {
    fn send(&mut self, msg: &ClientMessage) -> PlayerResult<()> {
        let text = msg.to_json()?;
        self.outbound
            .send(text)
            .map_err(|_| PlayerError::Transport("I/O thread gone".into()))
    }

    fn close(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("WebSocket I/O thread panicked ({})", self.url);
            }
        }
    }

    fn pacing(&self) -> Pacing {
        self.pacing
    }

    fn label(&self) -> &str {
        &self.url
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Manager

/// Inbound item handed to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ServerMessage),
    Closed(String),
}

struct Link {
    transport: Box<dyn Transport>,
    events: Receiver<TransportEvent>,
    via_fallback: bool,
}

/// Owns the single streaming connection
pub struct ConnectionManager {
    primary: Box<dyn Connector>,
    fallback: Option<Box<dyn Connector>>,
    link: Option<Link>,
}

impl ConnectionManager {
    pub fn new(primary: Box<dyn Connector>) -> Self {
        Self {
            primary,
            fallback: None,
            link: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn Connector>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Open a connection, closing any existing one first. When the primary
    /// connector fails and a fallback is configured, the fallback is tried.
    pub fn connect(&mut self, identity: &str) -> PlayerResult<Pacing> {
        if self.link.is_some() {
            debug!("connect: closing previous connection");
            self.close_link();
        }
        let (transport, events, via_fallback) = match self.primary.open(identity) {
            Ok((t, ev)) => (t, ev, false),
            Err(e) => match &self.fallback {
                Some(fb) => {
                    warn!("{} unavailable ({}); falling back to {}", self.primary.label(), e, fb.label());
                    let (t, ev) = fb.open(identity)?;
                    (t, ev, true)
                }
                None => return Err(e),
            },
        };
        let pacing = transport.pacing();
        info!("Connected via {} ({:?} pacing)", transport.label(), pacing);
        self.link = Some(Link {
            transport,
            events,
            via_fallback,
        });
        Ok(pacing)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn via_fallback(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.via_fallback)
    }

    pub fn pacing(&self) -> Option<Pacing> {
        self.link.as_ref().map(|l| l.transport.pacing())
    }

    /// Send one message; soft failure when not connected
    pub fn send(&mut self, msg: &ClientMessage) -> PlayerResult<()> {
        let Some(link) = self.link.as_mut() else {
            warn!("send {}: not connected", msg.kind());
            return Err(PlayerError::NotConnected);
        };
        trace!("-> {:?}", msg);
        link.transport.send(msg)
    }

    /// Drain inbound frames without blocking. A closed transport yields one
    /// `Closed` and drops the link.
    pub fn poll(&mut self) -> Vec<Inbound> {
        let mut out = Vec::new();
        let Some(link) = self.link.as_ref() else {
            return out;
        };
        let mut closed = None;
        loop {
            match link.events.try_recv() {
                Ok(TransportEvent::Text(text)) => match ServerMessage::parse(&text) {
                    Ok(msg) => out.push(Inbound::Message(msg)),
                    Err(e) => warn!("Dropping malformed message: {}", e),
                },
                Ok(TransportEvent::Closed(reason)) => {
                    closed = Some(reason);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = Some("transport thread ended".into());
                    break;
                }
            }
        }
        if let Some(reason) = closed {
            warn!("Connection closed: {}", reason);
            self.close_link();
            out.push(Inbound::Closed(reason));
        }
        out
    }

    /// Best-effort stop request, then close
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.transport.send(&ClientMessage::PlaybackStop {}) {
                debug!("disconnect: stop not delivered: {}", e);
            }
        }
        self.close_link();
    }

    fn close_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.transport.close();
            info!("Disconnected from {}", link.transport.label());
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_link();
    }
}
