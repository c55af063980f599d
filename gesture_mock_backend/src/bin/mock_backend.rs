use crossbeam_channel::bounded;
use gesture_mock_backend::{MainLoop, NetworkThread, DEFAULT_ADDR};
use gesture_protocol::{DetectionSource, Gesture, ServerMessage};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(33);

// 1x1 transparent PNG, enough for a client to render something.
const PLACEHOLDER_FRAME: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Replays a fake detection session: frames, clutch, gestures and actions.
struct SyntheticStream {
    tick: u64,
    next_gesture: usize,
}

impl SyntheticStream {
    fn new() -> Self {
        Self {
            tick: 0,
            next_gesture: 0,
        }
    }

    fn step(&mut self, main_loop: &mut MainLoop) {
        self.tick += 1;

        if self.tick % 3 == 0 {
            main_loop.send(ServerMessage::Frame {
                frame: PLACEHOLDER_FRAME.to_string(),
            });
        }

        if self.tick % 30 != 0 {
            return;
        }

        let gesture = Gesture::BINDABLE[self.next_gesture % Gesture::BINDABLE.len()];
        self.next_gesture += 1;
        let stable_frames = (self.tick / 30 % 6) as u32;
        let engaged = stable_frames >= 3;

        main_loop.send(ServerMessage::Clutch {
            engaged,
            stable_frames,
        });
        main_loop.send(ServerMessage::Gesture {
            gesture,
            confidence: 0.55 + 0.08 * stable_frames as f32,
            source: if stable_frames % 2 == 0 {
                DetectionSource::Local
            } else {
                DetectionSource::RemoteFallback
            },
            triggered: engaged,
        });

        if !engaged {
            return;
        }

        let description = main_loop
            .gestures()
            .get(&gesture)
            .map(|b| b.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| gesture.label());
        if gesture == Gesture::OpenPalm {
            main_loop.send(ServerMessage::Dictation { active: true });
        }
        main_loop.send(ServerMessage::Action {
            description,
            gesture,
            success: true,
        });
        if gesture != Gesture::OpenPalm {
            main_loop.send(ServerMessage::Dictation { active: false });
        }
    }
}

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("GESTURE_BACKEND_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);
    let stream = !args.iter().any(|a| a == "--no-stream");

    let (in_tx, in_rx) = bounded(gesture_mock_backend::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(gesture_mock_backend::OUTBOUND_CAP);

    let net = match NetworkThread::spawn_with_addr(&addr, in_tx, out_rx) {
        Ok(n) => n,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        if let Err(e) = fs::write(path, net.listen_addr().to_string()) {
            error!(path = %path.display(), "failed to write addr file: {e}");
        }
    }

    println!("mock_backend listening on ws://{}", net.listen_addr());

    let mut main_loop = MainLoop::new(in_rx, out_tx);
    let mut synthetic = SyntheticStream::new();

    let start = Instant::now();
    loop {
        main_loop.tick();
        if stream && main_loop.is_client_connected() {
            synthetic.step(&mut main_loop);
        }
        thread::sleep(TICK);
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    info!("mock backend stopping");
    net.shutdown();
}
