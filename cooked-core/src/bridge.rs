//! Websocket bridge to the consent-detection browser extension.
//!
//! The extension connects to [`BridgeHost`] and is told which consent choice
//! to apply. While the worker visits a page it waits for a `report` whose
//! lifecycle marks detection as finished. At most one extension connection is
//! live; a newer one replaces the older.

use crate::error::{CoreError, Result};
use crate::model::OptChoice;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const DEFAULT_BRIDGE_PORT: u16 = 5630;

const LIFECYCLE_DONE: &str = "done";
const LIFECYCLE_NOTHING_DETECTED: &str = "nothingDetected";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    OptChoice,
    Report,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::OptChoice => "optChoice",
            MessageKind::Report => "report",
        }
    }

    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            "optChoice" => Some(MessageKind::OptChoice),
            "report" => Some(MessageKind::Report),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    OptChoice { choice: OptChoice },
    Report { state: ReportState },
}

impl BridgeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BridgeMessage::OptChoice { .. } => MessageKind::OptChoice,
            BridgeMessage::Report { .. } => MessageKind::Report,
        }
    }
}

/// Detection state as reported by the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportState {
    pub lifecycle: String,
    #[serde(default)]
    pub detected_cmps: Vec<Value>,
    #[serde(default)]
    pub detected_popups: Vec<Value>,
}

impl ReportState {
    /// Only `done` and `nothingDetected` end a wait.
    pub fn is_complete(&self) -> bool {
        self.lifecycle == LIFECYCLE_DONE || self.lifecycle == LIFECYCLE_NOTHING_DETECTED
    }
}

/// Outcome of one page's detection; empty when the wait timed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub cmps: Vec<Value>,
    pub popups: Vec<Value>,
}

impl From<ReportState> for Report {
    fn from(state: ReportState) -> Self {
        Self {
            cmps: state.detected_cmps,
            popups: state.detected_popups,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    message: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Decode one inbound text frame. Unknown message types yield `Ok(None)`.
pub fn decode(text: &str) -> Result<Option<BridgeMessage>> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if MessageKind::from_type(&envelope.kind).is_none() {
        return Ok(None);
    }

    let mut payload = match envelope.message {
        Some(Value::Object(fields)) => fields,
        _ => envelope.rest,
    };
    payload.insert("type".to_string(), Value::String(envelope.kind));

    Ok(Some(serde_json::from_value(Value::Object(payload))?))
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    active: HashMap<MessageKind, (u64, mpsc::UnboundedSender<BridgeMessage>)>,
}

/// Routes inbound messages to at most one waiting handler per kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<Mutex<Handlers>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: MessageKind) -> Result<Registration> {
        let mut handlers = lock(&self.inner);
        if handlers.active.contains_key(&kind) {
            return Err(CoreError::HandlerBusy(kind));
        }

        handlers.next_id += 1;
        let id = handlers.next_id;
        let (tx, rx) = mpsc::unbounded_channel();
        handlers.active.insert(kind, (id, tx));

        Ok(Registration {
            kind,
            id,
            receiver: rx,
            registry: self.clone(),
        })
    }

    /// Hand a message to the handler for its kind. Returns false if none is waiting.
    pub fn dispatch(&self, message: BridgeMessage) -> bool {
        let handlers = lock(&self.inner);
        match handlers.active.get(&message.kind()) {
            Some((_, tx)) => tx.send(message).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, kind: MessageKind) -> bool {
        lock(&self.inner).active.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        lock(&self.inner).active.contains_key(&kind)
    }

    fn release(&self, kind: MessageKind, id: u64) {
        let mut handlers = lock(&self.inner);
        if matches!(handlers.active.get(&kind), Some((active, _)) if *active == id) {
            handlers.active.remove(&kind);
        }
    }
}

/// An active handler slot; unregisters itself when dropped.
pub struct Registration {
    kind: MessageKind,
    id: u64,
    receiver: mpsc::UnboundedReceiver<BridgeMessage>,
    registry: HandlerRegistry,
}

impl Registration {
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.receiver.recv().await
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(self.kind, self.id);
    }
}

/// A report wait armed ahead of navigation.
pub struct ReportWaiter {
    registration: Registration,
}

impl ReportWaiter {
    /// Wait for a completed report, falling back to an empty one on timeout.
    pub async fn wait(mut self, timeout: Duration) -> Report {
        let completed = tokio::time::timeout(timeout, async {
            while let Some(message) = self.registration.recv().await {
                if let BridgeMessage::Report { state } = message {
                    if state.is_complete() {
                        return Some(Report::from(state));
                    }
                    debug!("Report lifecycle '{}', still waiting", state.lifecycle);
                }
            }
            None
        })
        .await;

        match completed {
            Ok(Some(report)) => report,
            Ok(None) => Report::default(),
            Err(_) => {
                warn!("No extension report within {:?}, continuing", timeout);
                Report::default()
            }
        }
    }
}

struct ActiveConnection {
    id: u64,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct Connections {
    next_id: u64,
    active: Option<ActiveConnection>,
}

/// Owns the single live extension connection.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    inner: Arc<Mutex<Connections>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a connection, closing whichever one it replaces.
    pub fn connect(&self, peer: SocketAddr, outbound: mpsc::UnboundedSender<Message>) -> u64 {
        let mut connections = lock(&self.inner);
        connections.next_id += 1;
        let id = connections.next_id;

        let previous = connections.active.replace(ActiveConnection { id, peer, outbound });
        if let Some(previous) = previous {
            info!("Extension connection from {} replaces {}", peer, previous.peer);
            let _ = previous.outbound.send(Message::Close(None));
        }

        id
    }

    /// Close connection `id` if it is still the active one.
    pub fn close(&self, id: u64) -> bool {
        let mut connections = lock(&self.inner);
        match connections.active.take_if(|active| active.id == id) {
            Some(active) => {
                let _ = active.outbound.send(Message::Close(None));
                true
            }
            None => false,
        }
    }

    pub fn close_active(&self) -> bool {
        let mut connections = lock(&self.inner);
        match connections.active.take() {
            Some(active) => {
                let _ = active.outbound.send(Message::Close(None));
                true
            }
            None => false,
        }
    }

    /// Send to the active connection. Returns false when nothing is connected.
    pub fn send(&self, message: &BridgeMessage) -> Result<bool> {
        let text = serde_json::to_string(message)?;
        let connections = lock(&self.inner);
        Ok(match &connections.active {
            Some(active) => active.outbound.send(Message::Text(text)).is_ok(),
            None => false,
        })
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).active.is_some()
    }

    pub fn active_peer(&self) -> Option<SocketAddr> {
        lock(&self.inner).active.as_ref().map(|active| active.peer)
    }
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub bind: SocketAddr,
    pub choice: OptChoice,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_BRIDGE_PORT)),
            choice: OptChoice::default(),
        }
    }
}

/// Websocket server the extension connects to.
pub struct BridgeHost {
    local_addr: SocketAddr,
    connections: ConnectionManager,
    handlers: HandlerRegistry,
    accept_task: JoinHandle<()>,
}

impl BridgeHost {
    pub async fn bind(options: BridgeOptions) -> Result<Self> {
        let listener = TcpListener::bind(options.bind).await?;
        let local_addr = listener.local_addr()?;
        info!("Extension bridge listening on ws://{}", local_addr);

        let connections = ConnectionManager::new();
        let handlers = HandlerRegistry::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            connections.clone(),
            handlers.clone(),
            options.choice,
        ));

        Ok(Self {
            local_addr,
            connections,
            handlers,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Register for the next completed report without waiting yet.
    pub fn arm_report(&self) -> Result<ReportWaiter> {
        Ok(ReportWaiter {
            registration: self.handlers.register(MessageKind::Report)?,
        })
    }

    pub async fn await_report(&self, timeout: Duration) -> Result<Report> {
        Ok(self.arm_report()?.wait(timeout).await)
    }

    pub fn send(&self, message: &BridgeMessage) -> Result<bool> {
        self.connections.send(message)
    }
}

impl Drop for BridgeHost {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.connections.close_active();
    }
}

async fn accept_loop(
    listener: TcpListener,
    connections: ConnectionManager,
    handlers: HandlerRegistry,
    choice: OptChoice,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    connections.clone(),
                    handlers.clone(),
                    choice,
                ));
            }
            Err(e) => warn!("Extension bridge accept failed: {}", e),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    connections: ConnectionManager,
    handlers: HandlerRegistry,
    choice: OptChoice,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Websocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    info!("Extension connected from {}", peer);

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let id = connections.connect(peer, tx);
    match connections.send(&BridgeMessage::OptChoice { choice }) {
        Ok(true) => debug!("Sent {} to {}", choice, peer),
        Ok(false) => debug!("{} was replaced before the opt choice went out", peer),
        Err(e) => warn!("Could not encode opt choice: {}", e),
    }

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode(&text) {
                Ok(Some(message)) => {
                    let kind = message.kind();
                    if !handlers.dispatch(message) {
                        debug!("No handler waiting for '{}'", kind);
                    }
                }
                Ok(None) => debug!("Ignoring unknown extension message: {}", text),
                Err(e) => warn!("Malformed extension message from {}: {}", peer, e),
            },
            Ok(Message::Binary(_)) => debug!("Ignoring binary frame from {}", peer),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Extension connection {} errored: {}", peer, e);
                break;
            }
        }
    }

    connections.close(id);
    let _ = writer.await;
    info!("Extension at {} disconnected", peer);
}
