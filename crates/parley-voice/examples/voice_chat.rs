//! Voice chat in the terminal: type to chat, `/rec` and `/stop` to talk.
//!
//! Talks to the gateway at `PARLEY_GATEWAY_URL` (see `VoiceConfig`). Pass `--offline` to use
//! the placeholder services instead. Requires `--features device`.
//!
//! Commands: `/rec`, `/stop`, `/replay`, `/quit`; anything else is sent as a message.

use parley_voice::{
    AudioReference, CpalInput, Devices, Orchestrator, RodioOutput, Sender, Services, UiEvent,
    VoiceConfig,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = VoiceConfig::from_env();
    let offline = std::env::args().any(|a| a == "--offline");
    let services = if offline {
        info!("Using placeholder services (--offline)");
        Services::placeholder()
    } else {
        info!("Using gateway at {}", config.gateway_url);
        Services::gateway(&config)?
    };
    match CpalInput::list_input_devices() {
        Ok(names) => info!("Input devices: {}", names.join(", ")),
        Err(e) => warn!("Could not list input devices: {}", e),
    }
    let devices = Devices {
        input: Arc::new(CpalInput::new(config.sample_rate)),
        output: Arc::new(RodioOutput::new()?),
    };

    let (orchestrator, mut ui) = Orchestrator::new(&config, services, devices);

    let pump = orchestrator.clone();
    tokio::spawn(async move { pump.run_playback_events().await });

    let last_replay = Arc::new(tokio::sync::Mutex::new(None::<AudioReference>));
    let replay_slot = Arc::clone(&last_replay);
    tokio::spawn(async move {
        while let Some(event) = ui.recv().await {
            match event {
                UiEvent::Status(status) => println!("   [{}]", status),
                UiEvent::Log(entry) => {
                    let who = match entry.sender {
                        Sender::User => "You",
                        Sender::Bot => "Bot",
                        Sender::System => "System",
                    };
                    let marker = if entry.is_error() { " (error)" } else { "" };
                    println!("{}{}: {}", who, marker, entry.text);
                }
                UiEvent::ReplayAvailable(reference) => {
                    println!("   Type /replay to play {}", reference.describe());
                    *replay_slot.lock().await = Some(reference);
                }
                UiEvent::CaptureStateChanged(_) | UiEvent::PlaybackStateChanged(_) => {}
            }
        }
    });

    println!("Type a message, or /rec then /stop to speak. /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/rec" => {
                // Failures are already shown through the UI channel.
                let _ = orchestrator.start_recording().await;
            }
            "/stop" => {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.stop_recording().await });
            }
            "/replay" => {
                let pending = last_replay.lock().await.take();
                match pending {
                    Some(reference) => {
                        orchestrator.replay(reference).await;
                    }
                    None => println!("   Nothing to replay"),
                }
            }
            text => {
                let orchestrator = orchestrator.clone();
                let text = text.to_string();
                tokio::spawn(async move { orchestrator.send_chat_message(&text).await });
            }
        }
    }

    orchestrator.interrupt().await;
    Ok(())
}
