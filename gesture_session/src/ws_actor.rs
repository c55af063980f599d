//! tokio binding for [`SessionClient`]: one task per socket, one actor loop
//! that owns the client and serializes every event, command and timer.

use crate::client::{SessionClient, SessionEvent};
use crate::config::SessionConfig;
use crate::connection::{ConnectionId, Transport};
use crate::error::{ActorError, TransportError};
use crate::store::SessionStore;
use futures_util::{SinkExt, StreamExt};
use gesture_protocol::Gesture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

pub enum UiCommand {
    Connect,
    RequestConfig,
    RemapGesture {
        gesture: Gesture,
        command: String,
        description: Option<String>,
    },
    Shutdown,
}

pub struct WsTransport {
    events: mpsc::UnboundedSender<SessionEvent>,
    active: Option<ActiveSocket>,
}

struct ActiveSocket {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
    _task: JoinHandle<()>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            active: None,
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, endpoint: &Url, id: ConnectionId) -> Result<(), TransportError> {
        self.close();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(socket_task(
            endpoint.to_string(),
            id,
            outbound_rx,
            self.events.clone(),
        ));
        self.active = Some(ActiveSocket {
            id,
            outbound,
            _task: task,
        });
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let active = self.active.as_ref().ok_or(TransportError::NotConnected)?;
        active.outbound.send(text).map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        // Dropping the sender ends the socket task: an open socket sends a close
        // frame first, a handshake still in flight is abandoned.
        if let Some(active) = self.active.take() {
            debug!(id = active.id.value(), "closing socket");
        }
    }
}

async fn socket_task(
    endpoint: String,
    id: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let connect = tokio::time::timeout(
        CONNECT_TIMEOUT,
        tokio_tungstenite::connect_async(endpoint.as_str()),
    );
    let result = tokio::select! {
        result = connect => result,
        // Nothing is sent before `Opened`, so this only fires on close.
        _ = outbound.recv() => {
            debug!(id = id.value(), "connect abandoned");
            return;
        }
    };
    let socket = match result {
        Ok(Ok((socket, _))) => socket,
        Ok(Err(e)) => {
            let _ = events.send(SessionEvent::ConnectFailed {
                id,
                error: e.to_string(),
            });
            return;
        }
        Err(_) => {
            let _ = events.send(SessionEvent::ConnectFailed {
                id,
                error: format!("handshake timed out after {}ms", CONNECT_TIMEOUT.as_millis()),
            });
            return;
        }
    };
    let _ = events.send(SessionEvent::Opened { id });

    let (mut write, mut read) = socket.split();
    let reason = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    let _ = tokio::time::timeout(CLOSE_GRACE, write.send(Message::Close(None))).await;
                    return;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SessionEvent::Message { id, text: text.as_str().to_string() });
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.as_str().to_string()).filter(|r| !r.is_empty());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            }
        }
    };
    let _ = events.send(SessionEvent::Closed { id, reason });
}

/// Cheap, cloneable access for presentation: read/subscribe to the store and
/// send commands to the actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<UiCommand>,
    store: Arc<SessionStore>,
}

impl SessionHandle {
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<crate::store::SessionState> {
        self.store.subscribe()
    }

    pub async fn connect(&self) -> Result<(), ActorError> {
        self.send(UiCommand::Connect).await
    }

    pub async fn request_config(&self) -> Result<(), ActorError> {
        self.send(UiCommand::RequestConfig).await
    }

    pub async fn remap_gesture(
        &self,
        gesture: Gesture,
        command: impl Into<String>,
        description: Option<String>,
    ) -> Result<(), ActorError> {
        self.send(UiCommand::RemapGesture {
            gesture,
            command: command.into(),
            description,
        })
        .await
    }

    pub async fn shutdown(&self) -> Result<(), ActorError> {
        self.send(UiCommand::Shutdown).await
    }

    async fn send(&self, cmd: UiCommand) -> Result<(), ActorError> {
        self.tx.send(cmd).await.map_err(|_| ActorError::Unavailable)
    }
}

/// Build the store, transport and client, and spawn the actor. The actor
/// connects immediately and runs until [`SessionHandle::shutdown`] or until
/// every handle is dropped.
pub fn spawn(config: SessionConfig, store: SessionStore) -> (SessionHandle, JoinHandle<()>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (tx, rx) = mpsc::channel(32);

    let client = SessionClient::new(&config, store, WsTransport::new(events_tx));
    let store = Arc::clone(client.store());
    let task = tokio::spawn(run(client, events_rx, rx));
    (SessionHandle { tx, store }, task)
}

pub async fn run(
    mut client: SessionClient<WsTransport>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut rx: mpsc::Receiver<UiCommand>,
) {
    client.connect(Instant::now());

    loop {
        let deadline = client.next_deadline();
        tokio::select! {
            Some(event) = events.recv() => client.handle_event(event, Instant::now()),
            cmd = rx.recv() => match cmd {
                Some(UiCommand::Connect) => client.connect(Instant::now()),
                Some(UiCommand::RequestConfig) => {
                    client.commands().request_config();
                }
                Some(UiCommand::RemapGesture { gesture, command, description }) => {
                    if let Err(e) = client.commands().request_remap(gesture, &command, description.as_deref()) {
                        warn!("remap rejected: {e}");
                    }
                }
                Some(UiCommand::Shutdown) | None => break,
            },
            _ = sleep_until(deadline) => client.poll(Instant::now()),
        }
    }

    client.teardown();
    info!("session actor stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
