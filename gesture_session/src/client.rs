use crate::command::CommandChannel;
use crate::config::SessionConfig;
use crate::connection::{ConnectionId, ConnectionManager, ConnectionState, Transport};
use crate::dispatcher;
use crate::store::SessionStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Everything the transport can report about a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened { id: ConnectionId },
    Message { id: ConnectionId, text: String },
    Closed { id: ConnectionId, reason: Option<String> },
    ConnectFailed { id: ConnectionId, error: String },
}

/// The session core: connection lifecycle, inbound dispatch and the command
/// channel around one shared store. Not tied to any runtime; callers feed it
/// events and the current time, and sleep until [`SessionClient::next_deadline`].
pub struct SessionClient<T: Transport> {
    store: Arc<SessionStore>,
    connection: ConnectionManager<T>,
}

impl<T: Transport> SessionClient<T> {
    /// Takes ownership of the store so the configured toast duration applies;
    /// share it afterwards through [`SessionClient::store`].
    pub fn new(config: &SessionConfig, store: SessionStore, transport: T) -> Self {
        let store = Arc::new(store.with_toast_duration(config.toast_duration));
        let connection = ConnectionManager::new(
            transport,
            Arc::clone(&store),
            config.endpoint.clone(),
            config.reconnect_delay,
        );
        Self { store, connection }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.connection.current_id()
    }

    pub fn transport(&self) -> &T {
        self.connection.transport()
    }

    pub fn connect(&mut self, now: Instant) {
        self.connection.connect(now);
    }

    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Opened { id } => {
                if self.connection.on_opened(id) {
                    // Bindings are not persisted client-side; resync on every open.
                    self.commands().request_config();
                }
            }
            SessionEvent::Message { id, text } => {
                if !self.connection.is_current(id) {
                    debug!(id = id.value(), "dropping message from stale connection");
                    return;
                }
                dispatcher::dispatch_raw(&self.store, &text, now);
            }
            SessionEvent::Closed { id, reason } => {
                self.connection.on_closed(id, reason.as_deref(), now);
            }
            SessionEvent::ConnectFailed { id, error } => {
                self.connection.on_connect_failed(id, &error, now);
            }
        }
    }

    /// Fire whatever timers are due at `now`.
    pub fn poll(&mut self, now: Instant) {
        self.connection.poll(now);
        self.store.expire_toast(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.connection.reconnect_deadline(), self.store.toast_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn commands(&mut self) -> CommandChannel<'_, T> {
        CommandChannel::new(&mut self.connection, &self.store)
    }

    pub fn teardown(&mut self) {
        self.connection.teardown();
    }
}
