//! The voice session engine.
//!
//! [`VoiceSession`] ties capture, transport, playback, tools and the phase
//! machine together. A single event loop serializes every producer, so phase
//! transitions and scheduling decisions never race:
//!
//! ```text
//!   mic frames ──┐
//!   inbound WS ──┼──► engine loop ──► outbound queue ──► WS writer
//!   playback  ───┤        │
//!   completions  │        └──► phase machine / scheduler / transcript
//!   hang-up ─────┘
//! ```
//!
//! Teardown is deterministic and idempotent: the first `stop()` takes the
//! session handle and releases every resource; later calls find nothing and
//! return cleanly.

use crate::capture::{AudioFrame, CaptureHandle, CaptureSource};
use crate::config::SessionConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::keepalive::KeepAliveTicker;
use crate::playback::{PlaybackScheduler, PlaybackSink};
use crate::state::{Phase, SessionEvent, SessionStateMachine, StopReason};
use crate::summary::{SessionTiming, SummaryGenerator};
use crate::tools::{ToolDispatcher, ToolRegistry};
use crate::transcript::{TranscriptLog, TranscriptTurn};
use crate::transport::{Transport, TransportHandle};
use crate::wire::{InboundEvent, OutboundMessage, Speaker};
use crate::codec;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events generated inside the engine itself.
#[derive(Debug)]
enum EngineEvent {
    PlaybackDone { epoch: u64, seq: u64 },
    HangUpRequested,
    DrainTimeout,
}

/// Resources of one live session, released together on stop.
struct SessionHandle {
    capture: CaptureHandle,
    transport: TransportHandle,
    keepalive: KeepAliveTicker,
    engine: JoinHandle<()>,
    transcript: Arc<StdMutex<TranscriptLog>>,
    started_at: DateTime<Utc>,
}

/// A duplex voice session. Holds at most one live call at a time.
pub struct VoiceSession {
    config: SessionConfig,
    registry: ToolRegistry,
    capture: Arc<dyn CaptureSource>,
    sink: Arc<dyn PlaybackSink>,
    transport: Arc<dyn Transport>,
    summary: Arc<dyn SummaryGenerator>,
    machine: SessionStateMachine,
    inner: Mutex<Option<SessionHandle>>,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        registry: ToolRegistry,
        capture: Arc<dyn CaptureSource>,
        sink: Arc<dyn PlaybackSink>,
        transport: Arc<dyn Transport>,
        summary: Arc<dyn SummaryGenerator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            capture,
            sink,
            transport,
            summary,
            machine: SessionStateMachine::new(),
            inner: Mutex::new(None),
        })
    }

    /// Session wired to the real microphone, speakers and WebSocket
    /// transport, with a local summary fallback.
    pub fn with_defaults(config: SessionConfig, registry: ToolRegistry) -> VoiceResult<Arc<Self>> {
        let summary: Arc<dyn SummaryGenerator> = match crate::summary::HttpSummary::from_env() {
            Some(http) => Arc::new(http),
            None => Arc::new(crate::summary::PlaceholderSummary),
        };
        Ok(Self::new(
            config,
            registry,
            Arc::new(crate::capture::CpalCapture::new()),
            Arc::new(crate::playback::RodioSink::new()?),
            Arc::new(crate::transport::WsTransport::new()),
            summary,
        ))
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.machine.watch()
    }

    /// Snapshot of the live transcript. Empty when no session is active.
    pub async fn transcript(&self) -> Vec<TranscriptTurn> {
        let inner = self.inner.lock().await;
        match inner.as_ref() {
            Some(handle) => match handle.transcript.lock() {
                Ok(log) => log.turns().to_vec(),
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// Start the session: open the microphone, connect the transport,
    /// declare tools and begin streaming.
    ///
    /// Microphone access is checked before anything else is touched, so a
    /// permission failure leaves no connection behind.
    pub async fn start(self: &Arc<Self>) -> VoiceResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            return Err(VoiceError::AlreadyActive);
        }
        self.machine.apply(SessionEvent::StartRequested);

        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<AudioFrame>();
        let capture_handle = match self.capture.start(&self.config.capture, frame_tx) {
            Ok(handle) => handle,
            Err(err) => {
                self.reset_to_idle();
                return Err(err);
            }
        };

        let mut transport_handle = match self
            .transport
            .connect(&self.config, self.registry.schemas())
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                let mut capture_handle = capture_handle;
                capture_handle.stop();
                self.reset_to_idle();
                return Err(err);
            }
        };
        let Some(events) = transport_handle.take_events() else {
            let mut capture_handle = capture_handle;
            capture_handle.stop();
            transport_handle.close();
            self.reset_to_idle();
            return Err(VoiceError::Transport(
                "transport produced no event stream".to_string(),
            ));
        };
        self.machine.apply(SessionEvent::TransportOpen);

        let outbound = transport_handle.sender();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let hangup_tx = engine_tx.clone();
        let dispatcher = ToolDispatcher::new(
            self.registry.clone(),
            outbound.clone(),
            Arc::new(move || {
                let _ = hangup_tx.send(EngineEvent::HangUpRequested);
            }),
        );

        let transcript = Arc::new(StdMutex::new(TranscriptLog::new()));
        let engine = tokio::spawn(run_engine(EngineContext {
            session: Arc::downgrade(self),
            machine: self.machine.clone(),
            config: self.config.clone(),
            sink: self.sink.clone(),
            dispatcher,
            outbound,
            transcript: transcript.clone(),
            frame_rx,
            events,
            engine_rx,
            engine_tx,
        }));

        let keepalive = KeepAliveTicker::start(
            self.config.keepalive_interval,
            transport_handle.sender(),
            self.machine.watch(),
            self.config.capture.sample_rate,
        );

        *inner = Some(SessionHandle {
            capture: capture_handle,
            transport: transport_handle,
            keepalive,
            engine,
            transcript,
            started_at: Utc::now(),
        });
        info!("voice session started");
        Ok(())
    }

    /// Stop the session and release every resource. Idempotent: only the
    /// first call per session does any work.
    pub async fn stop(&self, reason: StopReason) -> VoiceResult<()> {
        let handle = { self.inner.lock().await.take() };
        let Some(mut handle) = handle else {
            return Ok(());
        };
        info!(reason = reason.as_str(), "stopping voice session");

        self.machine.apply(SessionEvent::StopRequested);
        handle.keepalive.stop();
        handle.capture.stop();
        self.sink.stop_all();
        handle.transport.close();
        handle.engine.abort();
        self.machine.apply(SessionEvent::TeardownComplete);

        let timing = SessionTiming {
            started_at: handle.started_at,
            ended_at: Utc::now(),
        };
        let turns = match handle.transcript.lock() {
            Ok(mut log) => {
                log.turn_boundary();
                log.turns().to_vec()
            }
            Err(_) => Vec::new(),
        };
        // Summary runs isolated from teardown; its failure only logs.
        let summary = self.summary.clone();
        tokio::spawn(async move {
            match summary.summarize(&turns, &timing).await {
                Ok(text) => info!(summary = %text, "session summary"),
                Err(err) => warn!(error = %err, "summary generation failed"),
            }
        });
        Ok(())
    }

    fn reset_to_idle(&self) {
        self.machine.apply(SessionEvent::StopRequested);
        self.machine.apply(SessionEvent::TeardownComplete);
    }
}

struct EngineContext {
    session: Weak<VoiceSession>,
    machine: SessionStateMachine,
    config: SessionConfig,
    sink: Arc<dyn PlaybackSink>,
    dispatcher: ToolDispatcher,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    transcript: Arc<StdMutex<TranscriptLog>>,
    frame_rx: mpsc::UnboundedReceiver<AudioFrame>,
    events: mpsc::UnboundedReceiver<InboundEvent>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
}

fn spawn_stop(session: &Weak<VoiceSession>, reason: StopReason) {
    if let Some(session) = session.upgrade() {
        tokio::spawn(async move {
            if let Err(err) = session.stop(reason).await {
                warn!(error = %err, "stop after terminal event failed");
            }
        });
    }
}

async fn run_engine(mut ctx: EngineContext) {
    let mut scheduler = PlaybackScheduler::new();
    let mut hangup_pending = false;
    let mut frames_open = true;

    loop {
        tokio::select! {
            frame = ctx.frame_rx.recv(), if frames_open => {
                let Some(frame) = frame else {
                    frames_open = false;
                    continue;
                };
                if matches!(
                    ctx.machine.phase(),
                    Phase::Listening | Phase::Processing | Phase::Speaking
                ) {
                    let message = OutboundMessage::audio_frame(
                        &frame.samples,
                        ctx.config.capture.sample_rate,
                    );
                    if ctx.outbound.send(message).is_err() {
                        warn!(seq = frame.seq, "outbound queue closed, dropping frame");
                    }
                }
            }

            event = ctx.events.recv() => {
                let Some(event) = event else {
                    warn!("event stream ended without a close event");
                    spawn_stop(&ctx.session, StopReason::TransportError);
                    break;
                };
                match event {
                    InboundEvent::Transcript { transcript } => {
                        if transcript.speaker == Speaker::Assistant {
                            ctx.machine.apply(SessionEvent::OutputTranscript);
                        }
                        if let Ok(mut log) = ctx.transcript.lock() {
                            log.push_fragment(&transcript);
                        }
                    }
                    InboundEvent::Audio { audio } => {
                        // A single corrupt chunk is dropped, not fatal.
                        let pcm = match codec::decode_frame(&audio.data) {
                            Ok(pcm) => pcm,
                            Err(err) => {
                                warn!(error = %err, "dropping undecodable audio chunk");
                                continue;
                            }
                        };
                        if audio.sample_rate_hz != ctx.config.playback_sample_rate {
                            debug!(
                                declared = audio.sample_rate_hz,
                                expected = ctx.config.playback_sample_rate,
                                "chunk declares a different playback rate"
                            );
                        }
                        let scheduled = scheduler.schedule(
                            pcm.len(),
                            audio.sample_rate_hz,
                            tokio::time::Instant::now(),
                        );
                        if let Err(err) =
                            ctx.sink.play(codec::to_f32(&pcm), audio.sample_rate_hz)
                        {
                            warn!(error = %err, "playback rejected a chunk");
                        }
                        ctx.machine.apply(SessionEvent::AudioChunkReceived);

                        let done_tx = ctx.engine_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep_until(scheduled.start + scheduled.duration).await;
                            let _ = done_tx.send(EngineEvent::PlaybackDone {
                                epoch: scheduled.epoch,
                                seq: scheduled.seq,
                            });
                        });
                    }
                    InboundEvent::ToolCalls { tool_calls } => {
                        ctx.machine.apply(SessionEvent::ToolCallsReceived);
                        ctx.dispatcher.dispatch_batch(tool_calls);
                    }
                    InboundEvent::TurnComplete { .. } => {
                        if let Ok(mut log) = ctx.transcript.lock() {
                            log.turn_boundary();
                        }
                    }
                    InboundEvent::Interrupted { .. } => {
                        // Barge-in: silence output now, discard the tail.
                        ctx.sink.stop_all();
                        let discarded = scheduler.interrupt(tokio::time::Instant::now());
                        debug!(discarded, "caller interrupted playback");
                        ctx.machine.apply(SessionEvent::Interrupted);
                        // Discarding the tail empties the tracked set, which
                        // is the drain a pending hang-up was waiting for.
                        if hangup_pending {
                            info!("barge-in emptied the playback queue, completing hang-up");
                            spawn_stop(&ctx.session, StopReason::HangUp);
                            break;
                        }
                    }
                    InboundEvent::Closed { closed } => {
                        let reason_text = closed.reason.unwrap_or_default();
                        info!(code = ?closed.code, reason = %reason_text, "endpoint closed the session");
                        let reason = if reason_text.contains("inactivity") {
                            StopReason::Timeout
                        } else {
                            StopReason::TransportError
                        };
                        spawn_stop(&ctx.session, reason);
                        break;
                    }
                    InboundEvent::Error { error } => {
                        warn!(error = %error, "endpoint reported an error");
                        spawn_stop(&ctx.session, StopReason::TransportError);
                        break;
                    }
                }
            }

            engine_event = ctx.engine_rx.recv() => {
                let Some(engine_event) = engine_event else { break };
                match engine_event {
                    EngineEvent::PlaybackDone { epoch, seq } => {
                        if scheduler.complete(epoch, seq) {
                            ctx.machine.apply(SessionEvent::PlaybackDrained);
                            if hangup_pending {
                                info!("playback drained, completing hang-up");
                                spawn_stop(&ctx.session, StopReason::HangUp);
                                break;
                            }
                        }
                    }
                    EngineEvent::HangUpRequested => {
                        ctx.machine.apply(SessionEvent::HangUpRequested);
                        if scheduler.tracked_count() == 0 {
                            spawn_stop(&ctx.session, StopReason::HangUp);
                            break;
                        }
                        // Let the goodbye finish, but not forever.
                        hangup_pending = true;
                        let timeout_tx = ctx.engine_tx.clone();
                        let drain_timeout = ctx.config.hangup_drain_timeout;
                        tokio::spawn(async move {
                            tokio::time::sleep(drain_timeout).await;
                            let _ = timeout_tx.send(EngineEvent::DrainTimeout);
                        });
                    }
                    EngineEvent::DrainTimeout => {
                        if hangup_pending {
                            warn!("hang-up drain timed out, stopping anyway");
                            spawn_stop(&ctx.session, StopReason::HangUp);
                            break;
                        }
                    }
                }
            }
        }
    }
    debug!("session engine exited");
}
