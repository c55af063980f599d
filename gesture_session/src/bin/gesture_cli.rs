use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use gesture_protocol::{default_gesture_config, Gesture, COMMAND_PRESETS};
use gesture_session::store::SessionState;
use gesture_session::{ws_actor, SessionConfig, SessionHandle, SessionStore, DEFAULT_WS_URL};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gesture_cli")]
struct Args {
    #[arg(long, default_value = DEFAULT_WS_URL, env = "GESTURE_WS_URL")]
    ws_url: String,

    /// Delay before reconnecting after the backend drops the socket.
    #[arg(long, default_value_t = 2000)]
    reconnect_ms: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Follow the live session and print every change.
    Monitor {
        /// Stop after this long instead of waiting for ctrl-c.
        #[arg(long)]
        run_for_ms: Option<u64>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Bind a gesture to a new command on the backend.
    Remap {
        #[arg(long, value_parser = parse_gesture)]
        gesture: Gesture,

        #[arg(long)]
        command: String,

        #[arg(long)]
        description: Option<String>,

        /// How long to wait for each config from the backend.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// List the command presets and factory bindings.
    Presets,
}

fn parse_gesture(raw: &str) -> Result<Gesture, String> {
    raw.parse::<Gesture>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Cmd::Presets = args.command {
        print_presets();
        return Ok(());
    }

    let mut config = SessionConfig::with_endpoint(&args.ws_url)?;
    config.reconnect_delay = Duration::from_millis(args.reconnect_ms);

    let (handle, task) = ws_actor::spawn(config, SessionStore::new());

    let result = match args.command {
        Cmd::Monitor { run_for_ms, json } => {
            monitor(&handle, run_for_ms.map(Duration::from_millis), json).await
        }
        Cmd::Remap {
            gesture,
            command,
            description,
            timeout_ms,
        } => {
            remap(
                &handle,
                gesture,
                &command,
                description,
                Duration::from_millis(timeout_ms),
            )
            .await
        }
        Cmd::Presets => Ok(()),
    };

    let _ = handle.shutdown().await;
    task.await.context("session actor panicked")?;
    result
}

async fn monitor(handle: &SessionHandle, run_for: Option<Duration>, json: bool) -> anyhow::Result<()> {
    let mut rx = handle.subscribe();
    let stop = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop);

    let mut last = String::new();
    loop {
        let line = {
            let state = rx.borrow_and_update();
            render(&state, json)?
        };
        // Frames arrive continuously; only print when something visible moved.
        if line != last {
            println!("{line}");
            last = line;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = &mut stop => return Ok(()),
        }
    }
}

fn render(state: &SessionState, json: bool) -> anyhow::Result<String> {
    let toast = state.toast.as_ref().map(|t| t.text.as_str());
    if json {
        let value = serde_json::json!({
            "connected": state.connected,
            "gesture": state.gesture,
            "clutch": state.clutch,
            "dictationActive": state.dictation_active,
            "toast": toast,
            "bindings": state.gesture_config.len(),
        });
        return Ok(serde_json::to_string(&value)?);
    }

    Ok(format!(
        "{} | {} {:.0}% ({:?}) | clutch {} [{}] | dictation {} | {}",
        if state.connected { "connected" } else { "disconnected" },
        state.gesture.current_gesture.label(),
        state.gesture.confidence * 100.0,
        state.gesture.detection_source,
        if state.clutch.engaged { "engaged" } else { "idle" },
        state.clutch.stable_frames,
        if state.dictation_active { "on" } else { "off" },
        toast.unwrap_or("-"),
    ))
}

async fn remap(
    handle: &SessionHandle,
    gesture: Gesture,
    command: &str,
    description: Option<String>,
    timeout: Duration,
) -> anyhow::Result<()> {
    if gesture == Gesture::None {
        bail!("`none` cannot be bound to a command");
    }

    let mut rx = handle.subscribe();
    tokio::time::timeout(timeout, rx.wait_for(|s| s.connected && !s.gesture_config.is_empty()))
        .await
        .map_err(|_| anyhow!("no config from backend within {}ms", timeout.as_millis()))?
        .map_err(|_| anyhow!("session stopped before the backend answered"))?;

    let special = handle
        .store()
        .read()
        .gesture_config
        .get(&gesture)
        .is_some_and(|b| b.is_special());
    if special {
        bail!("{gesture} triggers a built-in action and cannot be remapped");
    }

    let before = handle.store().read().config_revision;
    handle.remap_gesture(gesture, command, description).await?;
    if tokio::time::timeout(timeout, rx.wait_for(|s| s.config_revision > before))
        .await
        .is_err()
    {
        warn!("backend did not echo its config; showing the local edit");
    }

    let state = handle.store().snapshot();
    match state.gesture_config.get(&gesture) {
        Some(binding) => println!(
            "{} -> {} ({})",
            gesture,
            binding.command.as_deref().unwrap_or("-"),
            binding.description
        ),
        None => println!("{gesture} is unbound"),
    }
    Ok(())
}

fn print_presets() {
    for (group, commands) in COMMAND_PRESETS {
        println!("{group}:");
        for cmd in *commands {
            println!("  {cmd}");
        }
    }
    println!();
    println!("default bindings:");
    for (gesture, binding) in default_gesture_config() {
        let target = match (&binding.command, &binding.action) {
            (Some(cmd), _) => cmd.clone(),
            (None, Some(action)) => format!("{action:?}"),
            (None, None) => "-".to_string(),
        };
        println!("  {:<14} {:<16} {}", gesture.as_str(), binding.description, target);
    }
}
