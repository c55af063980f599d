//! Connection lifecycle: `Disconnected -> Connecting -> Open -> Disconnected`.
//!
//! The manager never talks to a socket directly. It drives a [`Transport`] and
//! reacts to lifecycle events tagged with the [`ConnectionId`] they belong to;
//! events from a superseded connection are ignored, so at most one connection
//! can ever influence state. Retries are unbounded and use a fixed delay, with
//! at most one pending retry deadline at any time.

use crate::error::TransportError;
use crate::store::SessionStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// The outbound socket, as seen by the lifecycle logic.
///
/// `open` starts an attempt and returns immediately; its outcome is reported
/// back as an `Opened`, `ConnectFailed` or `Closed` event carrying `id`.
pub trait Transport {
    fn open(&mut self, endpoint: &Url, id: ConnectionId) -> Result<(), TransportError>;
    fn send(&mut self, text: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

pub struct ConnectionManager<T: Transport> {
    transport: T,
    store: Arc<SessionStore>,
    endpoint: Url,
    reconnect_delay: Duration,
    state: ConnectionState,
    current: Option<ConnectionId>,
    next_id: u64,
    reconnect_at: Option<Instant>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, store: Arc<SessionStore>, endpoint: Url, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            store,
            endpoint,
            reconnect_delay,
            state: ConnectionState::Disconnected,
            current: None,
            next_id: 0,
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn current_id(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start a connection attempt unless one is already open or in flight.
    pub fn connect(&mut self, now: Instant) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "connect ignored");
            return;
        }
        self.reconnect_at = None;

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.current = Some(id);
        self.state = ConnectionState::Connecting;
        info!(endpoint = %self.endpoint, id = id.0, "connecting");

        if let Err(e) = self.transport.open(&self.endpoint, id) {
            self.on_connect_failed(id, &e.to_string(), now);
        }
    }

    /// Returns true when this event opened the current connection.
    pub fn on_opened(&mut self, id: ConnectionId) -> bool {
        if !self.is_current(id) || self.state != ConnectionState::Connecting {
            debug!(id = id.0, "ignoring open from stale connection");
            return false;
        }
        self.state = ConnectionState::Open;
        self.store.set_connected(true);
        info!(id = id.0, "connected");
        true
    }

    pub fn on_closed(&mut self, id: ConnectionId, reason: Option<&str>, now: Instant) {
        if !self.is_current(id) {
            debug!(id = id.0, "ignoring close from stale connection");
            return;
        }
        info!(id = id.0, reason = reason.unwrap_or("closed"), "connection lost");
        self.drop_connection(now);
    }

    pub fn on_connect_failed(&mut self, id: ConnectionId, error: &str, now: Instant) {
        if !self.is_current(id) {
            debug!(id = id.0, "ignoring failure from stale connection");
            return;
        }
        warn!(id = id.0, endpoint = %self.endpoint, "connect failed: {error}");
        self.drop_connection(now);
    }

    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.current == Some(id) && self.state != ConnectionState::Disconnected
    }

    /// Fire the pending reconnect if its deadline has passed.
    pub fn poll(&mut self, now: Instant) {
        match self.reconnect_at {
            Some(at) if at <= now => {
                self.reconnect_at = None;
                self.connect(now);
            }
            _ => {}
        }
    }

    /// Write one encoded message. Only valid while open.
    pub fn transmit(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.transport.send(text)
    }

    /// Cancel any pending retry and close the socket, whatever the current state.
    pub fn teardown(&mut self) {
        self.reconnect_at = None;
        self.transport.close();
        self.current = None;
        self.state = ConnectionState::Disconnected;
        self.store.set_connected(false);
        info!("session torn down");
    }

    fn drop_connection(&mut self, now: Instant) {
        self.transport.close();
        self.current = None;
        self.state = ConnectionState::Disconnected;
        self.store.set_connected(false);

        let at = now + self.reconnect_delay;
        if self.reconnect_at.replace(at).is_some() {
            debug!("replacing pending reconnect");
        }
        debug!(delay_ms = self.reconnect_delay.as_millis() as u64, "reconnect scheduled");
    }
}
