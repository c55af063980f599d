//! Session store: the one mutable state container shared between the session
//! loop and presentation.
//!
//! Every mutation runs to completion under the watch channel's lock and is
//! published to subscribers immediately; there is no batching. Reads through
//! [`SessionStore::read`] hold that lock, so keep the guard short-lived.

use gesture_protocol::{DetectionSource, Gesture, GestureConfigMap};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::TOAST_DURATION;

#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub data: String,
    #[serde(skip)]
    pub received_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GestureStatus {
    pub current_gesture: Gesture,
    pub confidence: f32,
    pub detection_source: DetectionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClutchStatus {
    pub engaged: bool,
    pub stable_frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionToast {
    pub text: String,
    pub gesture: Gesture,
    #[serde(skip)]
    pub shown_at: Instant,
    #[serde(skip)]
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiToggles {
    pub settings_visible: bool,
    pub hints_visible: bool,
}

impl Default for UiToggles {
    fn default() -> Self {
        Self {
            settings_visible: false,
            hints_visible: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub connected: bool,
    pub frame: Option<Frame>,
    pub gesture: GestureStatus,
    pub clutch: ClutchStatus,
    pub dictation_active: bool,
    pub toast: Option<ActionToast>,
    pub gesture_config: GestureConfigMap,
    /// Number of authoritative `config` messages applied so far.
    pub config_revision: u64,
    pub ui: UiToggles,
}

/// Fields carried by one `gesture` message; `None` leaves the stored value alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GestureUpdate {
    pub gesture: Option<Gesture>,
    pub confidence: Option<f32>,
    pub source: Option<DetectionSource>,
}

/// Fields carried by one `clutch` message; `None` leaves the stored value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClutchUpdate {
    pub engaged: Option<bool>,
    pub stable_frames: Option<u32>,
}

pub struct SessionStore {
    state: watch::Sender<SessionState>,
    toast_duration: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_gesture_config(GestureConfigMap::new())
    }

    /// Seed the gesture bindings shown before the backend's first `config`.
    pub fn with_gesture_config(gesture_config: GestureConfigMap) -> Self {
        let (state, _) = watch::channel(SessionState {
            gesture_config,
            ..SessionState::default()
        });
        Self {
            state,
            toast_duration: TOAST_DURATION,
        }
    }

    pub fn with_toast_duration(mut self, toast_duration: Duration) -> Self {
        self.toast_duration = toast_duration;
        self
    }

    pub fn read(&self) -> watch::Ref<'_, SessionState> {
        self.state.borrow()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.connected != connected;
            s.connected = connected;
            changed
        });
    }

    pub fn set_frame(&self, data: String, now: Instant) {
        self.state.send_modify(|s| {
            s.frame = Some(Frame {
                data,
                received_at: now,
            });
        });
    }

    pub fn merge_gesture(&self, update: GestureUpdate) {
        self.state.send_if_modified(|s| {
            let before = s.gesture;
            if let Some(gesture) = update.gesture {
                s.gesture.current_gesture = gesture;
            }
            if let Some(confidence) = update.confidence {
                s.gesture.confidence = confidence;
            }
            if let Some(source) = update.source {
                s.gesture.detection_source = source;
            }
            s.gesture != before
        });
    }

    pub fn merge_clutch(&self, update: ClutchUpdate) {
        self.state.send_if_modified(|s| {
            let before = s.clutch;
            if let Some(engaged) = update.engaged {
                s.clutch.engaged = engaged;
            }
            if let Some(stable_frames) = update.stable_frames {
                s.clutch.stable_frames = stable_frames;
            }
            s.clutch != before
        });
    }

    pub fn set_dictation(&self, active: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.dictation_active != active;
            s.dictation_active = active;
            changed
        });
    }

    /// Replace any live toast and restart the display timer from `now`.
    pub fn show_action(&self, text: String, gesture: Gesture, now: Instant) {
        let expires_at = now + self.toast_duration;
        self.state.send_modify(|s| {
            s.toast = Some(ActionToast {
                text,
                gesture,
                shown_at: now,
                expires_at,
            });
        });
    }

    pub fn dismiss_toast(&self) {
        self.state.send_if_modified(|s| s.toast.take().is_some());
    }

    pub fn expire_toast(&self, now: Instant) {
        self.state.send_if_modified(|s| {
            let expired = s.toast.as_ref().is_some_and(|t| t.expires_at <= now);
            if expired {
                debug!("toast expired");
                s.toast = None;
            }
            expired
        });
    }

    pub fn toast_deadline(&self) -> Option<Instant> {
        self.state.borrow().toast.as_ref().map(|t| t.expires_at)
    }

    /// Authoritative overwrite; local edits are not merged back in.
    pub fn replace_gesture_config(&self, gesture_config: GestureConfigMap) {
        self.state.send_modify(|s| {
            s.gesture_config = gesture_config;
            s.config_revision += 1;
        });
    }

    /// Local edit of one binding. The binding becomes a command binding; its
    /// description is the one supplied, else the previous one, else the command,
    /// else the gesture's label.
    pub fn update_gesture_command(&self, gesture: Gesture, command: &str, description: Option<&str>) {
        if gesture == Gesture::None {
            warn!("ignoring binding edit for gesture `none`");
            return;
        }
        self.state.send_modify(|s| {
            let binding = s.gesture_config.entry(gesture).or_default();
            let description = description
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .or_else(|| Some(binding.description.clone()).filter(|d| !d.is_empty()))
                .or_else(|| Some(command.to_string()).filter(|c| !c.is_empty()))
                .unwrap_or_else(|| gesture.label());
            binding.action = None;
            binding.command = Some(command.to_string());
            binding.description = description;
        });
    }

    pub fn set_settings_visible(&self, visible: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.ui.settings_visible != visible;
            s.ui.settings_visible = visible;
            changed
        });
    }

    pub fn toggle_settings(&self) {
        self.state.send_modify(|s| s.ui.settings_visible = !s.ui.settings_visible);
    }

    pub fn set_hints_visible(&self, visible: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.ui.hints_visible != visible;
            s.ui.hints_visible = visible;
            changed
        });
    }

    pub fn toggle_hints(&self) {
        self.state.send_modify(|s| s.ui.hints_visible = !s.ui.hints_visible);
    }
}
