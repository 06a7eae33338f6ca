//! Terminal client for the chat gateway.
//!
//! Lines typed on stdin are sent as text messages. `/voice` toggles voice
//! mode, `/talk` and `/done` start and finish a capture, `/quit` exits.
//! The terminal has no speech backends, so voice commands report the
//! missing capability.

use clap::Parser;
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxchat_client::{
    Command, ModeController, SpeakOptions, SpeechPlatform, Transport, TransportConfig,
    output::SpeechSynthesizer,
    probe,
    recognizer::{AudioInput, RecognitionService, Transcriber},
};
use voxchat_core::{FrameKind, ServerFrame};

#[derive(Parser)]
#[command(version, about = "Terminal client for the chat gateway")]
struct Args {
    /// Gateway WebSocket endpoint.
    #[arg(default_value = "ws://localhost:3000/ws")]
    url: String,
    /// Seconds to wait before reconnecting after a drop.
    #[arg(long, default_value_t = 3)]
    reconnect_secs: u64,
}

struct TerminalPlatform;

impl SpeechPlatform for TerminalPlatform {
    fn recognition_service(&self) -> Option<Arc<dyn RecognitionService>> {
        None
    }

    fn audio_input(&self) -> Option<Arc<dyn AudioInput>> {
        None
    }

    fn transcriber(&self) -> Option<Arc<dyn Transcriber>> {
        None
    }

    fn synthesizer(&self) -> Option<Arc<dyn SpeechSynthesizer>> {
        None
    }
}

fn print_frame(frame: ServerFrame) {
    match frame {
        ServerFrame::Message(message) | ServerFrame::VoiceResponse(message) => {
            println!("[{}] {}", message.sender, message.content);
        }
        ServerFrame::Error { message } => eprintln!("error: {message}"),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut config = TransportConfig::new(args.url);
    config.reconnect_delay = Duration::from_secs(args.reconnect_secs);
    let transport = Arc::new(Transport::new(config));
    let frames = transport.subscribe(&FrameKind::ALL);
    let mut display = transport.subscribe(&[
        FrameKind::Message,
        FrameKind::VoiceResponse,
        FrameKind::Error,
    ]);
    transport.connect();

    let (controller, events) = ModeController::new(
        transport.clone(),
        probe(&TerminalPlatform),
        SpeakOptions::default(),
    );
    let (command_tx, command_rx) = mpsc::channel(16);
    let runner = tokio::spawn(controller.run(command_rx, frames, events));
    tokio::spawn(async move {
        while let Some(frame) = display.recv().await {
            print_frame(frame);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.trim() {
            "" => continue,
            "/quit" => break,
            "/voice" => Command::ToggleMode,
            "/talk" => Command::StartCapture,
            "/done" => Command::StopCapture,
            text => Command::SendText(text.to_string()),
        };
        if command_tx.send(command).await.is_err() {
            break;
        }
    }

    drop(command_tx);
    let controller = runner.await?;
    if let Some(error) = controller.last_error() {
        warn!(%error, "Exiting with an unacknowledged error.");
    }
    transport.disconnect();
    info!("Bye.");
    Ok(())
}
