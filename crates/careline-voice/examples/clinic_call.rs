//! Live clinic call demo.
//!
//! Connects the default microphone and speakers to a realtime endpoint and
//! exposes the clinic's scheduling tools. Configure through the environment
//! (a `.env` file works):
//!
//! ```text
//! CARELINE_ENDPOINT=wss://example.com/realtime
//! CARELINE_API_KEY=...
//! ```
//!
//! Run with `cargo run --example clinic_call`, talk, and say goodbye to let
//! the assistant hang up. Ctrl-C also stops the session cleanly.

use anyhow::Result;
use careline_records::store::MemoryRecordStore;
use careline_voice::{list_input_devices, Phase, SessionConfig, StopReason, ToolRegistry, VoiceSession};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careline_voice=debug,careline_records=debug,info".into()),
        )
        .init();

    match list_input_devices() {
        Ok(devices) => info!(?devices, "available input devices"),
        Err(err) => info!(error = %err, "could not enumerate input devices"),
    }

    let mut config = SessionConfig::from_env()?;
    if config.instructions.is_empty() {
        config.instructions = "You are Careline, the voice assistant for the Maple Street \
            clinic. Help callers find providers, book, reschedule or cancel \
            appointments, and keep answers short and spoken-friendly. When the \
            caller is done and goodbyes are exchanged, call hang_up."
            .to_string();
    }

    let store = Arc::new(MemoryRecordStore::with_demo_data());
    let mut registry = ToolRegistry::new();
    careline_records::tools::register_all(&mut registry, store);

    let session = VoiceSession::with_defaults(config, registry)?;
    let mut phases = session.watch_phase();
    session.start().await?;
    info!("call started, speak into the microphone");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, hanging up");
            for turn in session.transcript().await {
                println!("{:?}: {}", turn.speaker, turn.text);
            }
            session.stop(StopReason::UserStop).await?;
        }
        _ = async {
            // The session returns to Idle once the assistant hangs up or the
            // endpoint closes.
            while phases.changed().await.is_ok() {
                if *phases.borrow() == Phase::Idle {
                    break;
                }
            }
        } => {
            info!("call ended");
        }
    }
    Ok(())
}
