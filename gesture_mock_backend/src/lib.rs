//! Stand-in gesture backend: a single-client websocket server that owns the
//! gesture bindings and can replay a synthetic detection stream.

pub mod error;
pub mod main_loop;
pub mod net;
pub mod protocol;

pub use error::BackendError;
pub use main_loop::MainLoop;
pub use net::{NetworkThread, DEFAULT_ADDR};
pub use protocol::{InboundMsg, OutboundMsg, INBOUND_CAP, OUTBOUND_CAP};
