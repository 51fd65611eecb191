//! # Scripted Feed Example
//!
//! Drives a lectern from an in-process [`TransportFactory`] instead of a game
//! server: the feed plays a short round (player assigned, buzz, release, no
//! player, server drop) and the display line is printed as it changes.
//!
//! Useful as a template for custom transports and for checking a render
//! target without any network.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_feed
//! ```

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lectern_client::{
    LecternClient, LecternConfig, LecternError, LecternEvent, LecternMessage, PlayerState,
    SharedDisplay, Transport, TransportFactory,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// A channel-backed transport and a factory that hands out one of them
// ─────────────────────────────────────────────────────────────────────

struct FeedTransport {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for FeedTransport {
    async fn recv(&mut self) -> Option<Result<String, LecternError>> {
        // `UnboundedReceiver::recv` is cancel-safe; `None` once the feed drops.
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), LecternError> {
        self.rx.close();
        Ok(())
    }
}

/// Hands out the feed on the first connect and refuses afterwards.
struct FeedFactory {
    feed: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait]
impl TransportFactory for FeedFactory {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LecternError> {
        tracing::info!("connect {url}");
        let feed = self
            .feed
            .lock()
            .map_err(|_| LecternError::NotRunning)?
            .take();
        match feed {
            Some(rx) => Ok(Box::new(FeedTransport { rx })),
            None => Err(LecternError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "feed already used",
            ))),
        }
    }
}

fn state(name: &str, score: i64, active: bool, buzzed: bool) -> Result<String, LecternError> {
    LecternMessage::PlayerState(PlayerState {
        name: Some(name.to_string()),
        score,
        active,
        buzzed,
    })
    .to_frame()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    let factory = FeedFactory {
        feed: Mutex::new(Some(feed_rx)),
    };
    // Short delays so the whole round plays in a few seconds.
    let config = LecternConfig::new("feed.invalid")
        .with_player_number(1)
        .with_light_stage_interval(Duration::from_millis(250))
        .with_reconnect_delay(Duration::from_millis(300))
        .with_max_reconnect_attempts(2);

    let display = SharedDisplay::new();
    let (mut client, mut events) = LecternClient::start(config, factory, display.clone());

    // The round: (delay before the frame, frame).
    let script = vec![
        (200, state("Alice", 0, false, false)?),
        (300, state("Alice", 400, true, false)?),
        (300, state("Alice", 400, true, true)?),
        (1500, state("Alice", -200, false, false)?),
        (300, LecternMessage::NoPlayer.to_frame()?),
    ];
    tokio::spawn(async move {
        for (delay_ms, frame) in script {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if feed_tx.send(frame).is_err() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        // Dropping the sender closes the socket; retries are refused.
        drop(feed_tx);
    });

    let mut refresh = tokio::time::interval(Duration::from_millis(50));
    let mut last_line = String::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(LecternEvent::ConnectionLost) | None => break,
                Some(other) => tracing::debug!("event: {other:?}"),
            },
            _ = refresh.tick() => {
                let line = display.snapshot().to_string();
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
        }
    }

    println!("{}", display.snapshot());
    client.shutdown().await;
    Ok(())
}
