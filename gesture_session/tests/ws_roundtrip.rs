use crossbeam_channel::{bounded, Receiver, Sender};
use gesture_mock_backend::{MainLoop, NetworkThread};
use gesture_protocol::{Gesture, GestureConfigMap, ServerMessage};
use gesture_session::store::SessionState;
use gesture_session::{ws_actor, SessionConfig, SessionHandle, SessionStore};
use std::io::Read;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

struct Backend {
    net: NetworkThread,
    inject: Sender<ServerMessage>,
    gestures: Receiver<GestureConfigMap>,
    stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl Backend {
    fn start() -> Self {
        let (in_tx, in_rx) = bounded(gesture_mock_backend::INBOUND_CAP);
        let (out_tx, out_rx) = bounded(gesture_mock_backend::OUTBOUND_CAP);
        let net = NetworkThread::spawn_with_addr("127.0.0.1:0", in_tx, out_rx).expect("spawn net");

        let (inject, inject_rx) = bounded::<ServerMessage>(16);
        let (gestures_tx, gestures) = bounded(16);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);

        let ticker = thread::spawn(move || {
            let mut main_loop = MainLoop::new(in_rx, out_tx);
            let mut last = main_loop.gestures().clone();
            while !stop_for_thread.load(Ordering::Relaxed) {
                main_loop.tick();
                while let Ok(msg) = inject_rx.try_recv() {
                    main_loop.send(msg);
                }
                if *main_loop.gestures() != last {
                    last = main_loop.gestures().clone();
                    let _ = gestures_tx.try_send(last.clone());
                }
                thread::sleep(Duration::from_millis(10));
            }
        });

        Self {
            net,
            inject,
            gestures,
            stop,
            ticker: Some(ticker),
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.net.listen_addr())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.ticker.take() {
            let _ = t.join();
        }
        self.net.shutdown();
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn wait_for(handle: &SessionHandle, what: &str, f: impl FnMut(&SessionState) -> bool) {
    let mut rx = handle.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(f))
        .await
        .unwrap_or_else(|_| panic!("timeout waiting for {what}"))
        .expect("store alive");
}

fn spawn_client(backend: &Backend) -> (SessionHandle, tokio::task::JoinHandle<()>) {
    let mut config = SessionConfig::with_endpoint(&backend.url()).expect("valid url");
    config.reconnect_delay = Duration::from_millis(100);
    ws_actor::spawn(config, SessionStore::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_syncs_config_and_remaps_over_a_real_socket() {
    let backend = Backend::start();
    let (handle, task) = spawn_client(&backend);

    wait_for(&handle, "initial config", |s| {
        s.connected && s.gesture_config.len() == 10
    })
    .await;

    handle
        .remap_gesture(Gesture::ThumbsUp, "show git status", None)
        .await
        .expect("actor alive");

    let gestures = tokio::task::spawn_blocking({
        let rx = backend.gestures.clone();
        move || rx.recv_timeout(WAIT)
    })
    .await
    .expect("join")
    .expect("backend applied the remap");
    let binding = &gestures[&Gesture::ThumbsUp];
    assert_eq!(binding.command.as_deref(), Some("show git status"));
    assert_eq!(binding.description, "Commit & Push");

    wait_for(&handle, "echoed config", |s| {
        s.gesture_config
            .get(&Gesture::ThumbsUp)
            .is_some_and(|b| b.command.as_deref() == Some("show git status"))
    })
    .await;

    handle.shutdown().await.expect("actor alive");
    task.await.expect("actor exits cleanly");
    assert!(!handle.store().read().connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_pushes_reach_the_store() {
    let backend = Backend::start();
    let (handle, task) = spawn_client(&backend);

    // The first config proves the backend registered this client.
    wait_for(&handle, "connection", |s| {
        s.connected && !s.gesture_config.is_empty()
    })
    .await;

    backend
        .inject
        .send(ServerMessage::Clutch {
            engaged: true,
            stable_frames: 5,
        })
        .unwrap();
    backend
        .inject
        .send(ServerMessage::Action {
            description: "Run Tests".to_string(),
            gesture: Gesture::RockSign,
            success: true,
        })
        .unwrap();

    wait_for(&handle, "clutch and toast", |s| {
        s.clutch.engaged
            && s.clutch.stable_frames == 5
            && s.toast.as_ref().is_some_and(|t| t.text == "Run Tests")
    })
    .await;

    // Toasts expire on their own after the display duration.
    wait_for(&handle, "toast expiry", |s| s.toast.is_none()).await;

    handle.shutdown().await.expect("actor alive");
    task.await.expect("actor exits cleanly");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_shutdown_marks_the_session_disconnected() {
    let mut backend = Backend::start();
    let (handle, task) = spawn_client(&backend);

    wait_for(&handle, "connection", |s| s.connected).await;
    tokio::task::block_in_place(|| backend.stop());
    wait_for(&handle, "disconnect", |s| !s.connected).await;

    handle.shutdown().await.expect("actor alive");
    task.await.expect("actor exits cleanly");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_releases_a_socket_stuck_in_handshake() {
    // Accepts the TCP connection but never answers the upgrade request.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (request_tx, request_rx) = bounded::<()>(1);

    let peer = tokio::task::spawn_blocking(move || {
        let (mut stream, _) = listener.accept().expect("client dials in");
        stream
            .set_read_timeout(Some(Duration::from_millis(50)))
            .expect("read timeout");
        let mut buf = [0u8; 1024];
        let mut deadline = Instant::now() + WAIT;
        let mut saw_request = false;
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return saw_request,
                Ok(_) => {
                    if !saw_request {
                        saw_request = true;
                        let _ = request_tx.send(());
                        // From here the client has this long to let go.
                        deadline = Instant::now() + Duration::from_secs(2);
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => return saw_request,
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    });

    let config = SessionConfig::with_endpoint(&format!("ws://{addr}")).expect("valid url");
    let (handle, task) = ws_actor::spawn(config, SessionStore::new());

    tokio::task::spawn_blocking(move || request_rx.recv_timeout(WAIT))
        .await
        .expect("join")
        .expect("upgrade request reached the listener");
    assert!(!handle.store().read().connected);

    handle.shutdown().await.expect("actor alive");
    task.await.expect("actor exits cleanly");

    assert!(
        peer.await.expect("join"),
        "socket still open after teardown"
    );
}
