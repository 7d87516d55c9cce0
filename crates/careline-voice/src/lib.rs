//! # Careline Voice
//!
//! Real-time duplex voice engine for the Careline clinic assistant.
//! Streams the caller's microphone to a conversational endpoint, plays the
//! synthesized replies gapless, runs the endpoint's tool calls against the
//! clinic's records, and tears everything down deterministically.
//!
//! ```text
//!  ┌──────────┐  f32 frames  ┌───────────────┐  pcm16/base64  ┌──────────┐
//!  │   mic    ├─────────────►│               ├───────────────►│          │
//!  │  (cpal)  │              │ session engine│   WebSocket    │ realtime │
//!  └──────────┘              │               │◄───────────────┤ endpoint │
//!  ┌──────────┐  scheduled   │  phase machine│  audio / text  │          │
//!  │ speakers │◄─────────────┤  + scheduler  │  / tool calls  └──────────┘
//!  │ (rodio)  │              └──────┬────────┘
//!  └──────────┘                     │ tool results
//!                              ┌────▼────┐
//!                              │  tools  │
//!                              └─────────┘
//! ```
//!
//! Entry point is [`VoiceSession`]: build one with [`VoiceSession::with_defaults`],
//! register [`ToolHandler`]s, `start()`, and `stop()` when done (or let the
//! endpoint's `hang_up` tool end the call).

pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod playback;
pub mod session;
pub mod state;
pub mod summary;
pub mod tools;
pub mod transcript;
pub mod transport;
pub mod wire;

pub use capture::{list_input_devices, AudioFrame, CaptureHandle, CaptureSource, CpalCapture};
pub use config::{AudioConfig, SessionConfig};
pub use error::{VoiceError, VoiceResult};
pub use playback::{PlaybackScheduler, PlaybackSink, RodioSink};
pub use session::VoiceSession;
pub use state::{Phase, StopReason};
pub use summary::{HttpSummary, PlaceholderSummary, SessionTiming, SummaryGenerator};
pub use tools::{ToolHandler, ToolRegistry, HANG_UP_TOOL};
pub use transcript::{TranscriptLog, TranscriptTurn};
pub use transport::{Transport, TransportHandle, WsTransport};
pub use wire::{InboundEvent, OutboundMessage, Speaker, ToolInvocation, TranscriptFragment};
