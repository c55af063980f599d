use crate::error::BackendError;
use crate::protocol::{ClientCommand, Envelope, InboundMsg, OutboundMsg, ServerMessage};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8765";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(30);
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

struct ActiveClient {
    ws: tungstenite::WebSocket<TcpStream>,
    socket_addr: SocketAddr,
}

pub struct NetworkThread {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    listen_addr: SocketAddr,
}

impl NetworkThread {
    pub fn spawn(in_tx: Sender<InboundMsg>, out_rx: Receiver<OutboundMsg>) -> Result<Self, BackendError> {
        Self::spawn_with_addr(DEFAULT_ADDR, in_tx, out_rx)
    }

    /// Bind on `addr` (port 0 picks a free port) and serve from a background thread.
    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, BackendError> {
        let listener = TcpListener::bind(addr).map_err(|source| BackendError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let listen_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let join_handle =
            thread::spawn(move || run_server(listener, in_tx, out_rx, shutdown_for_thread));

        info!("mock backend listening on ws://{listen_addr}");
        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
            listen_addr,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut active: Option<ActiveClient> = None;

    while !shutdown.load(Ordering::Relaxed) {
        // Accept new connections (single-client policy: newest wins).
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    let Some(ws) = accept_client(stream) else { continue };

                    if let Some(mut prev) = active.take() {
                        info!(addr = %prev.socket_addr, "replacing previous client");
                        let _ = prev.ws.close(None);
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }

                    if in_tx.try_send(InboundMsg::ClientConnected { socket_addr }).is_err() {
                        warn!("main loop busy, refusing client");
                        let mut ws = ws;
                        let _ = ws.close(None);
                        continue;
                    }

                    info!(addr = %socket_addr, "client connected");
                    active = Some(ActiveClient { ws, socket_addr });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("ws accept failed: {e}");
                    break;
                }
            }
        }

        // Outbound: drain queued messages.
        if let Some(client) = active.as_mut() {
            loop {
                match out_rx.try_recv() {
                    Ok(OutboundMsg::Send { msg }) => {
                        if send_server_message(&mut client.ws, &msg).is_err() {
                            let _ = client.ws.close(None);
                            active = None;
                            let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }
        }

        // Inbound: read at most one message per loop (timeouts keep the loop moving).
        if let Some(client) = active.as_mut() {
            match client.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, client, msg).is_err() {
                        let _ = client.ws.close(None);
                        active = None;
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    info!("client disconnected: {e}");
                    active = None;
                    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                }
            }
        } else {
            // If no active client, avoid busy-looping.
            thread::sleep(Duration::from_millis(25));
        }
    }

    if let Some(mut client) = active {
        let _ = client.ws.close(None);
        let _ = client.ws.flush();
    }
}

fn accept_client(stream: TcpStream) -> Option<tungstenite::WebSocket<TcpStream>> {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
    let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));

    let ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("ws handshake failed: {e}");
            return None;
        }
    };
    let _ = ws.get_ref().set_read_timeout(Some(READ_TIMEOUT));
    Some(ws)
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    client: &mut ActiveClient,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) => return Ok(()),
        Message::Ping(payload) => {
            let _ = client.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Pong(_) => return Ok(()),
        Message::Close(_) => return Err(()),
        Message::Frame(_) => return Ok(()),
    };

    let envelope: Envelope = match serde_json::from_str(&text) {
        Ok(env) => env,
        Err(_) => {
            warn!("invalid json from client: {text}");
            return Ok(());
        }
    };

    let kind = envelope.kind.clone();
    let cmd: ClientCommand = match envelope.parse() {
        Ok(c) => c,
        Err(e) => {
            warn!(%kind, "ignoring client message: {e}");
            return Ok(());
        }
    };

    debug!(%kind, "client command");
    if in_tx.try_send(InboundMsg::Command { cmd }).is_err() {
        warn!(%kind, "main loop busy, dropping command");
    }
    Ok(())
}

fn send_server_message(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let payload = serde_json::to_string(msg).map_err(|_| ())?;
    ws.send(Message::Text(payload.into())).map_err(|_| ())
}
