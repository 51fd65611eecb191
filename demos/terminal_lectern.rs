//! # Terminal Lectern
//!
//! Runs a lectern display against a live game server and prints the display
//! line every time it changes.
//!
//! ## Running
//!
//! ```sh
//! # Game server on localhost:8080, lectern for player 0:
//! cargo run --example terminal_lectern
//!
//! # Another server / player:
//! LECTERN_HOST=quiz.local:8080 LECTERN_PLAYER=2 cargo run --example terminal_lectern
//! ```
//!
//! Press Enter to simulate the page becoming visible again (restarts a lost
//! connection). Ctrl+C quits.

use std::time::Duration;

use lectern_client::{LecternClient, LecternConfig, LecternEvent, SharedDisplay, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

/// How often the display line is checked for changes (the light chase changes
/// without an event).
const REFRESH: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = LecternConfig::from_env();
    tracing::info!("Lectern socket: {}", config.socket_url());

    let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
    let display = SharedDisplay::new();
    let (mut client, mut event_rx) = LecternClient::start(config, connector, display.clone());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut refresh = tokio::time::interval(REFRESH);
    let mut last_line = String::new();
    let mut stdin_open = true;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                match event {
                    LecternEvent::ConnectionLost => {
                        tracing::error!("Connection lost; press Enter to retry");
                    }
                    LecternEvent::MalformedFrame { error } => {
                        tracing::warn!("Dropped malformed frame: {error}");
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            _ = refresh.tick() => {
                let line = display.snapshot().to_string();
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => client.set_visible(true)?,
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    Ok(())
}
