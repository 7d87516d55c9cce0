//! Gapless playback of synthesized audio.
//!
//! Two pieces: [`RodioSink`], a thread-owned rodio output (like capture,
//! `OutputStream` is not `Send`), and [`PlaybackScheduler`], the pure
//! bookkeeping that gives every chunk a start time of
//! `max(now, end of previous chunk)` so consecutive chunks butt up against
//! each other regardless of network jitter.
//!
//! Interruption bumps an epoch counter; completion reports from buffers
//! scheduled before the interrupt carry a stale epoch and are ignored.

use crate::error::{VoiceError, VoiceResult};
use std::collections::HashSet;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Plays raw samples. The engine only sees this trait.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, samples: Vec<f32>, sample_rate: u32) -> VoiceResult<()>;

    /// Drop everything queued and silence output immediately.
    fn stop_all(&self);
}

enum SinkCommand {
    Play { samples: Vec<f32>, sample_rate: u32 },
    StopAll,
    Shutdown,
}

/// Playback sink backed by the default rodio output device.
pub struct RodioSink {
    command_tx: std_mpsc::Sender<SinkCommand>,
}

impl RodioSink {
    pub fn new() -> VoiceResult<Self> {
        let (command_tx, command_rx) = std_mpsc::channel::<SinkCommand>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<()>>();

        std::thread::Builder::new()
            .name("careline-playback".to_string())
            .spawn(move || {
                let opened = rodio::OutputStream::try_default()
                    .map_err(|e| VoiceError::Playback(format!("output device: {}", e)))
                    .and_then(|(stream, handle)| {
                        rodio::Sink::try_new(&handle)
                            .map(|sink| (stream, sink))
                            .map_err(|e| VoiceError::Playback(format!("sink: {}", e)))
                    });
                let (_stream, sink) = match opened {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    match command {
                        SinkCommand::Play {
                            samples,
                            sample_rate,
                        } => {
                            sink.append(rodio::buffer::SamplesBuffer::new(1, sample_rate, samples));
                            sink.play();
                        }
                        SinkCommand::StopAll => {
                            sink.stop();
                            sink.play();
                        }
                        SinkCommand::Shutdown => break,
                    }
                }
                info!("playback stopped");
            })
            .map_err(|e| VoiceError::Playback(format!("playback thread spawn failed: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { command_tx }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(VoiceError::Playback(
                "playback thread exited before reporting readiness".to_string(),
            )),
        }
    }
}

impl PlaybackSink for RodioSink {
    fn play(&self, samples: Vec<f32>, sample_rate: u32) -> VoiceResult<()> {
        self.command_tx
            .send(SinkCommand::Play {
                samples,
                sample_rate,
            })
            .map_err(|_| VoiceError::Playback("playback thread is gone".to_string()))
    }

    fn stop_all(&self) {
        if self.command_tx.send(SinkCommand::StopAll).is_err() {
            warn!("stop_all after playback thread exit");
        }
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SinkCommand::Shutdown);
    }
}

/// A chunk the scheduler has placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledBuffer {
    pub seq: u64,
    pub epoch: u64,
    pub start: Instant,
    pub duration: Duration,
}

/// Timeline bookkeeping for inbound audio chunks.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_seq: u64,
    epoch: u64,
    last_end: Option<Instant>,
    tracked: HashSet<u64>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a chunk: it starts when the previous one ends, or now if the
    /// timeline has drained. Duration follows the chunk's declared rate so
    /// the modeled timeline matches what the sink actually plays.
    pub fn schedule(
        &mut self,
        sample_count: usize,
        sample_rate_hz: u32,
        now: Instant,
    ) -> ScheduledBuffer {
        let duration = Duration::from_secs_f64(sample_count as f64 / sample_rate_hz as f64);
        let start = match self.last_end {
            Some(end) if end > now => end,
            _ => now,
        };
        self.last_end = Some(start + duration);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.tracked.insert(seq);
        debug!(seq, ?duration, "scheduled playback chunk");
        ScheduledBuffer {
            seq,
            epoch: self.epoch,
            start,
            duration,
        }
    }

    /// Record that a chunk finished. Returns true when the timeline drained.
    /// Reports from before an interrupt carry a stale epoch and are ignored.
    pub fn complete(&mut self, epoch: u64, seq: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.tracked.remove(&seq);
        self.tracked.is_empty()
    }

    /// Discard everything scheduled and reset the timeline to `now`.
    /// Returns how many chunks were discarded.
    pub fn interrupt(&mut self, now: Instant) -> usize {
        let discarded = self.tracked.len();
        self.tracked.clear();
        self.epoch += 1;
        self.last_end = Some(now);
        discarded
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
