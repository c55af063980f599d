use gesture_protocol::{Gesture, SpecialAction};
use gesture_session::{
    ConnectionId, ConnectionState, SessionClient, SessionConfig, SessionEvent, SessionStore,
    Transport, TransportError,
};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

const DELAY: Duration = Duration::from_millis(2000);

#[derive(Default)]
struct ScriptedTransport {
    opened: Vec<ConnectionId>,
    sent: Vec<String>,
    closes: usize,
}

impl ScriptedTransport {
    fn sent_kinds(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|raw| {
                let v: Value = serde_json::from_str(raw).expect("client sends json");
                v["type"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, _endpoint: &Url, id: ConnectionId) -> Result<(), TransportError> {
        self.opened.push(id);
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

fn client() -> SessionClient<ScriptedTransport> {
    SessionClient::new(
        &SessionConfig::default(),
        SessionStore::new(),
        ScriptedTransport::default(),
    )
}

fn open(client: &mut SessionClient<ScriptedTransport>, now: Instant) -> ConnectionId {
    client.connect(now);
    let id = client.current_connection().expect("attempt in flight");
    client.handle_event(SessionEvent::Opened { id }, now);
    id
}

fn message(id: ConnectionId, raw: &str) -> SessionEvent {
    SessionEvent::Message {
        id,
        text: raw.to_string(),
    }
}

#[test]
fn open_requests_config_exactly_once() {
    let mut client = client();
    let t0 = Instant::now();
    let id = open(&mut client, t0);

    assert_eq!(client.connection_state(), ConnectionState::Open);
    assert!(client.store().read().connected);
    assert_eq!(client.transport().sent_kinds(), vec!["get_config"]);

    // A duplicate open for the same connection must not resend.
    client.handle_event(SessionEvent::Opened { id }, t0);
    assert_eq!(client.transport().sent.len(), 1);

    let sent: Value = serde_json::from_str(&client.transport().sent[0]).unwrap();
    assert_eq!(sent["payload"], serde_json::json!({}));
}

#[test]
fn live_messages_update_the_projection() {
    let mut client = client();
    let t0 = Instant::now();
    let id = open(&mut client, t0);

    client.handle_event(message(id, r#"{"type":"frame","payload":{"frame":"QUJD"}}"#), t0);
    client.handle_event(
        message(
            id,
            r#"{"type":"gesture","payload":{"gesture":"rock_sign","confidence":0.91,"source":"gemini"}}"#,
        ),
        t0,
    );
    client.handle_event(
        message(id, r#"{"type":"clutch","payload":{"engaged":true,"stableFrames":4}}"#),
        t0,
    );
    client.handle_event(message(id, r#"{"type":"dictation","payload":{"active":true}}"#), t0);

    let state = client.store().snapshot();
    assert_eq!(state.frame.map(|f| f.data).as_deref(), Some("QUJD"));
    assert_eq!(state.gesture.current_gesture, Gesture::RockSign);
    assert!((state.gesture.confidence - 0.91).abs() < 1e-6);
    assert!(state.clutch.engaged);
    assert_eq!(state.clutch.stable_frames, 4);
    assert!(state.dictation_active);
}

#[test]
fn toast_outlives_a_disconnect_and_keeps_its_deadline() {
    let mut client = client();
    let t0 = Instant::now();
    let id = open(&mut client, t0);

    client.handle_event(
        message(
            id,
            r#"{"type":"action","payload":{"description":"Run Tests","gesture":"rock_sign"}}"#,
        ),
        t0,
    );
    let expires_at = t0 + Duration::from_millis(2000);
    assert_eq!(client.store().toast_deadline(), Some(expires_at));

    let t1 = t0 + Duration::from_millis(500);
    client.handle_event(SessionEvent::Closed { id, reason: None }, t1);
    assert!(!client.store().read().connected);
    assert_eq!(
        client.store().read().toast.as_ref().map(|t| t.text.clone()).as_deref(),
        Some("Run Tests")
    );
    assert_eq!(client.store().toast_deadline(), Some(expires_at));

    // Toast deadline comes before the reconnect at t1 + 2000ms.
    assert_eq!(client.next_deadline(), Some(expires_at));
    client.poll(expires_at);
    assert!(client.store().read().toast.is_none());
    assert_eq!(client.next_deadline(), Some(t1 + DELAY));
}

#[test]
fn config_overwrites_local_edits() {
    let mut client = client();
    let t0 = Instant::now();
    let id = open(&mut client, t0);

    client.handle_event(
        message(
            id,
            r#"{"type":"config","payload":{"gestures":{
                "open_palm":{"action":"voice_dictation","description":"Voice Input"},
                "shaka":{"command":"/clear","description":"Clear Chat"}
            }}}"#,
        ),
        t0,
    );
    assert_eq!(client.store().read().gesture_config.len(), 2);
    assert_eq!(
        client.store().read().gesture_config[&Gesture::OpenPalm].action,
        Some(SpecialAction::VoiceDictation)
    );

    let sent = client
        .commands()
        .request_remap(Gesture::Shaka, "run tests", None)
        .expect("shaka is a command binding");
    assert!(sent);
    assert_eq!(
        client.store().read().gesture_config[&Gesture::Shaka].command.as_deref(),
        Some("run tests")
    );
    assert_eq!(client.transport().sent_kinds(), vec!["get_config", "update_gesture"]);

    // The backend never applied it; its next config wins wholesale.
    client.handle_event(
        message(
            id,
            r#"{"type":"config","payload":{"gestures":{"shaka":{"command":"/clear","description":"Clear Chat"}}}}"#,
        ),
        t0,
    );
    let state = client.store().snapshot();
    assert_eq!(state.gesture_config.len(), 1);
    assert_eq!(
        state.gesture_config[&Gesture::Shaka].command.as_deref(),
        Some("/clear")
    );
}

#[test]
fn stale_connection_events_are_ignored() {
    let mut client = client();
    let t0 = Instant::now();
    let first = open(&mut client, t0);

    client.handle_event(SessionEvent::Closed { id: first, reason: Some("bye".into()) }, t0);
    let t1 = t0 + DELAY;
    client.poll(t1);
    let second = client.current_connection().expect("reconnect in flight");
    assert_ne!(first, second);
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    // Late traffic from the first socket changes nothing.
    client.handle_event(SessionEvent::Opened { id: first }, t1);
    client.handle_event(message(first, r#"{"type":"dictation","payload":{"active":true}}"#), t1);
    client.handle_event(SessionEvent::Closed { id: first, reason: None }, t1);
    assert_eq!(client.connection_state(), ConnectionState::Connecting);
    assert!(!client.store().read().dictation_active);
    assert_eq!(client.next_deadline(), None);

    client.handle_event(SessionEvent::Opened { id: second }, t1);
    assert_eq!(client.connection_state(), ConnectionState::Open);
    assert_eq!(client.transport().sent_kinds(), vec!["get_config", "get_config"]);
}

#[test]
fn reconnect_fires_once_after_the_delay() {
    let mut client = client();
    let t0 = Instant::now();
    client.connect(t0);
    let id = client.current_connection().unwrap();

    client.handle_event(
        SessionEvent::ConnectFailed {
            id,
            error: "connection refused".into(),
        },
        t0,
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.next_deadline(), Some(t0 + DELAY));

    client.poll(t0 + Duration::from_millis(1999));
    assert_eq!(client.transport().opened.len(), 1);

    client.poll(t0 + DELAY);
    assert_eq!(client.transport().opened.len(), 2);
    assert_eq!(client.next_deadline(), None);

    // Already connecting: neither connect nor poll opens another socket.
    client.connect(t0 + DELAY);
    client.poll(t0 + DELAY * 2);
    assert_eq!(client.transport().opened.len(), 2);
}

#[test]
fn commands_are_dropped_while_disconnected() {
    let mut client = client();
    assert!(!client.commands().request_config());
    assert!(client.transport().sent.is_empty());

    let t0 = Instant::now();
    client.connect(t0);
    assert!(!client.commands().request_config());
    assert!(client.transport().sent.is_empty());
}

#[test]
fn teardown_cancels_the_pending_reconnect() {
    let mut client = client();
    let t0 = Instant::now();
    let id = open(&mut client, t0);
    client.handle_event(SessionEvent::Closed { id, reason: None }, t0);
    assert!(client.next_deadline().is_some());

    client.teardown();
    assert_eq!(client.next_deadline(), None);
    client.poll(t0 + DELAY);
    assert_eq!(client.transport().opened.len(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn configured_toast_duration_drives_expiry() {
    let mut config = SessionConfig::default();
    config.toast_duration = Duration::from_millis(500);
    let mut client = SessionClient::new(&config, SessionStore::new(), ScriptedTransport::default());
    let t0 = Instant::now();
    let id = open(&mut client, t0);

    client.handle_event(
        message(id, r#"{"type":"action","payload":{"description":"Help","gesture":"ok_sign"}}"#),
        t0,
    );
    assert_eq!(client.next_deadline(), Some(t0 + Duration::from_millis(500)));
    client.poll(t0 + Duration::from_millis(500));
    assert!(client.store().read().toast.is_none());
}
