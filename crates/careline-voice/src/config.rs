//! Session and audio configuration

use crate::error::{VoiceError, VoiceResult};
use std::time::Duration;

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Frame size in samples (default: 4096, ~256ms at 16kHz)
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_size: 4096,
        }
    }
}

/// Configuration for a realtime voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the realtime conversational service.
    pub endpoint: String,

    /// Bearer API key, attached to the connect request when present.
    pub api_key: Option<String>,

    /// Requested assistant voice.
    pub voice: String,

    /// Natural-language instructions declared to the endpoint on connect.
    pub instructions: String,

    /// Microphone capture settings.
    pub capture: AudioConfig,

    /// Sample rate of synthesized audio sent back by the endpoint.
    pub playback_sample_rate: u32,

    /// Interval between keep-alive silence frames.
    pub keepalive_interval: Duration,

    /// How long the transport tolerates total inbound silence before it
    /// reports the connection closed.
    pub inactivity_tolerance: Duration,

    /// Upper bound on how long a deferred hang-up waits for playback to drain.
    pub hangup_drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let keepalive_interval = Duration::from_secs(15);
        Self {
            endpoint: "wss://localhost:9090/realtime".to_string(),
            api_key: None,
            voice: "marin".to_string(),
            instructions: String::new(),
            capture: AudioConfig::default(),
            playback_sample_rate: 24000,
            keepalive_interval,
            inactivity_tolerance: keepalive_interval * 3,
            hangup_drain_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Build from environment: `CARELINE_ENDPOINT` (required), `CARELINE_API_KEY`,
    /// `CARELINE_VOICE`, `CARELINE_INSTRUCTIONS`.
    pub fn from_env() -> VoiceResult<Self> {
        let endpoint = std::env::var("CARELINE_ENDPOINT")
            .map_err(|_| VoiceError::Config("CARELINE_ENDPOINT is not set".to_string()))?;
        let mut config = Self {
            endpoint,
            api_key: std::env::var("CARELINE_API_KEY").ok(),
            ..Self::default()
        };
        if let Ok(voice) = std::env::var("CARELINE_VOICE") {
            config.voice = voice;
        }
        if let Ok(instructions) = std::env::var("CARELINE_INSTRUCTIONS") {
            config.instructions = instructions;
        }
        Ok(config)
    }
}
