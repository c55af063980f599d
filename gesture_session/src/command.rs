use crate::codec;
use crate::connection::{ConnectionManager, Transport};
use crate::error::CommandError;
use crate::store::SessionStore;
use gesture_protocol::{ClientCommand, Gesture};
use tracing::{debug, info, warn};

/// Outbound path. Sends go out only while the connection is open; otherwise
/// they are dropped without error and without queueing.
pub struct CommandChannel<'a, T: Transport> {
    connection: &'a mut ConnectionManager<T>,
    store: &'a SessionStore,
}

impl<'a, T: Transport> CommandChannel<'a, T> {
    pub fn new(connection: &'a mut ConnectionManager<T>, store: &'a SessionStore) -> Self {
        Self { connection, store }
    }

    /// Returns whether the command was handed to the transport.
    pub fn send(&mut self, cmd: &ClientCommand) -> bool {
        if !self.connection.is_open() {
            debug!(kind = cmd.kind(), "not connected, dropping command");
            return false;
        }
        let text = match codec::encode_command(cmd) {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = cmd.kind(), "{e}");
                return false;
            }
        };
        match self.connection.transmit(text) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = cmd.kind(), "send failed: {e}");
                false
            }
        }
    }

    pub fn request_config(&mut self) -> bool {
        self.send(&ClientCommand::GetConfig {})
    }

    /// Apply the edit locally, then ask the backend to make it authoritative.
    ///
    /// The next `config` from the backend replaces the local map wholesale, so
    /// an edit that never reaches the backend is reverted by that message.
    pub fn request_remap(
        &mut self,
        gesture: Gesture,
        command: &str,
        description: Option<&str>,
    ) -> Result<bool, CommandError> {
        if gesture == Gesture::None {
            return Err(CommandError::UnbindableGesture);
        }
        let command = command.trim();
        if command.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        let special = self
            .store
            .read()
            .gesture_config
            .get(&gesture)
            .is_some_and(|b| b.is_special());
        if special {
            return Err(CommandError::SpecialBinding(gesture));
        }

        self.store.update_gesture_command(gesture, command, description);
        info!(%gesture, command, "remap requested");
        Ok(self.send(&ClientCommand::UpdateGesture {
            gesture,
            command: command.to_string(),
        }))
    }
}
