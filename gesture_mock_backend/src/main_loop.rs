use crate::protocol::{
    default_gesture_config, ClientCommand, Gesture, GestureConfigMap, InboundMsg, OutboundMsg,
    ServerMessage,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

/// Backend-side owner of the gesture bindings. Drains commands from the
/// network thread once per tick and answers with `config` broadcasts.
pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    gestures: GestureConfigMap,
    client_connected: bool,
}

impl MainLoop {
    pub fn new(inbound_rx: Receiver<InboundMsg>, outbound_tx: Sender<OutboundMsg>) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            gestures: default_gesture_config(),
            client_connected: false,
        }
    }

    pub fn with_gestures(mut self, gestures: GestureConfigMap) -> Self {
        self.gestures = gestures;
        self
    }

    pub fn gestures(&self) -> &GestureConfigMap {
        &self.gestures
    }

    pub fn is_client_connected(&self) -> bool {
        self.client_connected
    }

    pub fn tick(&mut self) {
        let mut send_config = false;

        loop {
            match self.inbound_rx.try_recv() {
                Ok(msg) => match msg {
                    InboundMsg::ClientConnected { socket_addr } => {
                        debug!(addr = %socket_addr, "pushing config to new client");
                        self.client_connected = true;
                        send_config = true;
                    }
                    InboundMsg::ClientDisconnected => {
                        self.client_connected = false;
                        send_config = false;
                    }
                    InboundMsg::Command { cmd } => match cmd {
                        ClientCommand::GetConfig {} => send_config = true,
                        ClientCommand::UpdateGesture { gesture, command } => {
                            if self.update_gesture(gesture, command) {
                                send_config = true;
                            }
                        }
                    },
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if send_config {
            self.broadcast_config();
        }
    }

    /// Queue a message for the connected client; dropped when nobody listens.
    pub fn send(&mut self, msg: ServerMessage) -> bool {
        if !self.client_connected {
            return false;
        }
        self.try_send(OutboundMsg::Send { msg })
    }

    pub fn try_send(&mut self, msg: OutboundMsg) -> bool {
        self.outbound_tx.try_send(msg).is_ok()
    }

    fn broadcast_config(&mut self) {
        let msg = ServerMessage::Config {
            gestures: self.gestures.clone(),
        };
        if !self.send(msg) {
            warn!("config broadcast dropped");
        }
    }

    /// Rebind `gesture` to a plain command. The description survives; a
    /// special action does not.
    fn update_gesture(&mut self, gesture: Gesture, command: String) -> bool {
        if gesture == Gesture::None {
            warn!("ignoring update_gesture for `none`");
            return false;
        }
        let binding = self.gestures.entry(gesture).or_default();
        binding.command = Some(command);
        binding.action = None;
        if binding.description.is_empty() {
            binding.description = gesture.label();
        }
        info!(gesture = %gesture, command = binding.command.as_deref().unwrap_or_default(), "gesture remapped");
        true
    }
}
