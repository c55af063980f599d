//! Routes decoded envelopes to store mutations.
//!
//! Each handler reads only the fields it knows about. A missing field leaves
//! the stored value alone; a field of the wrong JSON type is logged and treated
//! as missing, so a bad payload can degrade the projection but never stop
//! the stream.

use crate::codec;
use crate::store::{ClutchUpdate, GestureUpdate, SessionStore};
use gesture_protocol::{kind, Envelope, Gesture, GestureBinding, GestureConfigMap};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

type Payload = Map<String, Value>;
type Handler = fn(&SessionStore, &Payload, Instant);

const HANDLERS: &[(&str, Handler)] = &[
    (kind::FRAME, on_frame as Handler),
    (kind::GESTURE, on_gesture as Handler),
    (kind::CLUTCH, on_clutch as Handler),
    (kind::DICTATION, on_dictation as Handler),
    (kind::ACTION, on_action as Handler),
    (kind::CONFIG, on_config as Handler),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Applied,
    Unrecognized,
    Malformed,
}

/// Decode one raw wire message and apply it.
pub fn dispatch_raw(store: &SessionStore, raw: &str, now: Instant) -> Dispatch {
    match codec::decode(raw) {
        Ok(envelope) => dispatch(store, &envelope, now),
        Err(e) => {
            warn!("dropping message: {e}");
            Dispatch::Malformed
        }
    }
}

pub fn dispatch(store: &SessionStore, envelope: &Envelope, now: Instant) -> Dispatch {
    let Some((_, handler)) = HANDLERS.iter().find(|(k, _)| *k == envelope.kind) else {
        warn!(kind = %envelope.kind, "unrecognized message kind");
        return Dispatch::Unrecognized;
    };
    handler(store, &envelope.payload, now);
    Dispatch::Applied
}

fn on_frame(store: &SessionStore, payload: &Payload, now: Instant) {
    if let Some(frame) = typed_field::<String>(kind::FRAME, payload, "frame") {
        debug!(bytes = frame.len(), "frame");
        store.set_frame(frame, now);
    }
}

fn on_gesture(store: &SessionStore, payload: &Payload, _now: Instant) {
    let confidence = typed_field::<f32>(kind::GESTURE, payload, "confidence")
        .filter(|c| {
            let finite = c.is_finite();
            if !finite {
                warn!(kind = kind::GESTURE, "ignoring non-finite confidence");
            }
            finite
        })
        .map(|c| c.clamp(0.0, 1.0));

    store.merge_gesture(GestureUpdate {
        gesture: typed_field(kind::GESTURE, payload, "gesture"),
        confidence,
        source: typed_field(kind::GESTURE, payload, "source"),
    });
}

fn on_clutch(store: &SessionStore, payload: &Payload, _now: Instant) {
    store.merge_clutch(ClutchUpdate {
        engaged: typed_field(kind::CLUTCH, payload, "engaged"),
        stable_frames: typed_field(kind::CLUTCH, payload, "stableFrames"),
    });
}

fn on_dictation(store: &SessionStore, payload: &Payload, _now: Instant) {
    if let Some(active) = typed_field(kind::DICTATION, payload, "active") {
        store.set_dictation(active);
    }
}

fn on_action(store: &SessionStore, payload: &Payload, now: Instant) {
    let text = typed_field::<String>(kind::ACTION, payload, "description").unwrap_or_default();
    let gesture = typed_field::<Gesture>(kind::ACTION, payload, "gesture").unwrap_or_default();
    store.show_action(text, gesture, now);
}

fn on_config(store: &SessionStore, payload: &Payload, _now: Instant) {
    let config = gesture_config(payload);
    debug!(bindings = config.len(), "authoritative config");
    store.replace_gesture_config(config);
}

fn gesture_config(payload: &Payload) -> GestureConfigMap {
    let mut config = GestureConfigMap::new();
    let Some(entries) = typed_field::<Map<String, Value>>(kind::CONFIG, payload, "gestures") else {
        return config;
    };

    for (name, value) in &entries {
        let gesture = match name.parse::<Gesture>() {
            Ok(Gesture::None) | Err(_) => {
                warn!(gesture = %name, "skipping binding for unknown gesture");
                continue;
            }
            Ok(g) => g,
        };
        match GestureBinding::deserialize(value) {
            Ok(binding) => {
                config.insert(gesture, binding);
            }
            Err(e) => warn!(%gesture, "skipping malformed binding: {e}"),
        }
    }
    config
}

/// Read `key` as `T`. Absent or null yields `None` silently; a value of the
/// wrong shape yields `None` with a warning.
fn typed_field<T: DeserializeOwned>(msg_kind: &str, payload: &Payload, key: &str) -> Option<T> {
    let value = payload.get(key).filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(kind = msg_kind, field = key, "ignoring mis-typed field: {e}");
            None
        }
    }
}
