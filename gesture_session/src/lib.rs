pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod store;
pub mod ws_actor;

use std::time::Duration;

pub use client::{SessionClient, SessionEvent};
pub use command::CommandChannel;
pub use config::SessionConfig;
pub use connection::{ConnectionId, ConnectionManager, ConnectionState, Transport};
pub use error::{ActorError, CodecError, CommandError, TransportError};
pub use store::{SessionState, SessionStore};
pub use ws_actor::{SessionHandle, UiCommand, WsTransport};

pub use gesture_protocol as protocol;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8765";
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);
pub const TOAST_DURATION: Duration = Duration::from_millis(2000);
