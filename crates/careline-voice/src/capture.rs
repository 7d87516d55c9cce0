//! Microphone capture.
//!
//! `cpal::Stream` is not `Send`, so the live stream is owned by a dedicated
//! OS thread. The thread accumulates callback buffers into fixed-size frames
//! and pushes them over an unbounded channel; a stop signal tears the stream
//! down by dropping it on its own thread.

use crate::config::AudioConfig;
use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One captured frame of normalized mono samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Monotonic frame counter, starting at 0.
    pub seq: u64,
    pub samples: Vec<f32>,
}

/// Source of captured audio frames. The engine only sees this trait, so
/// tests substitute scripted sources for the real microphone.
pub trait CaptureSource: Send + Sync {
    fn start(
        &self,
        config: &AudioConfig,
        frame_tx: mpsc::UnboundedSender<AudioFrame>,
    ) -> VoiceResult<CaptureHandle>;
}

/// Handle to a running capture. Stopping signals the owning thread; the
/// thread drops the stream and exits on its own.
pub struct CaptureHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn new(stop_tx: std_mpsc::Sender<()>, thread: JoinHandle<()>) -> Self {
        Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    /// Handle with nothing to stop, for sources that finish on their own.
    pub fn detached() -> Self {
        Self {
            stop_tx: None,
            thread: None,
        }
    }

    /// Signal the capture thread to stop. Does not block on the thread; the
    /// stream is dropped as soon as the thread observes the signal.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.thread.take();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture source backed by the default cpal input device.
#[derive(Default)]
pub struct CpalCapture;

impl CpalCapture {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSource for CpalCapture {
    fn start(
        &self,
        config: &AudioConfig,
        frame_tx: mpsc::UnboundedSender<AudioFrame>,
    ) -> VoiceResult<CaptureHandle> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<()>>();
        let frame_size = config.frame_size;
        let sample_rate = config.sample_rate;
        let channels = config.channels;

        let thread = std::thread::Builder::new()
            .name("careline-capture".to_string())
            .spawn(move || {
                let result = (|| -> VoiceResult<cpal::Stream> {
                    let host = cpal::default_host();
                    let device = host.default_input_device().ok_or_else(|| {
                        VoiceError::Permission("no input device available".to_string())
                    })?;
                    debug!(
                        device = device.name().unwrap_or_else(|_| "<unknown>".to_string()),
                        "opening input device"
                    );

                    let stream_config = cpal::StreamConfig {
                        channels,
                        sample_rate: cpal::SampleRate(sample_rate),
                        buffer_size: cpal::BufferSize::Default,
                    };

                    let mut pending: Vec<f32> = Vec::with_capacity(frame_size);
                    let mut seq: u64 = 0;
                    let stream = device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _| {
                            pending.extend_from_slice(data);
                            while pending.len() >= frame_size {
                                let samples: Vec<f32> = pending.drain(..frame_size).collect();
                                let frame = AudioFrame { seq, samples };
                                seq += 1;
                                if frame_tx.send(frame).is_err() {
                                    // Engine is gone; stop is on its way.
                                    return;
                                }
                            }
                        },
                        |err| warn!(error = %err, "input stream error"),
                        None,
                    )?;
                    stream.play()?;
                    Ok(stream)
                })();

                match result {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Hold the stream until stopped; recv errs when the
                        // handle is dropped, which also means stop.
                        let _ = stop_rx.recv();
                        drop(stream);
                        info!("capture stopped");
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| VoiceError::AudioDevice(format!("capture thread spawn failed: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(sample_rate, frame_size, "microphone capture started");
                Ok(CaptureHandle::new(stop_tx, thread))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(VoiceError::AudioDevice(
                "capture thread exited before reporting readiness".to_string(),
            )),
        }
    }
}

/// Names of available input devices, for diagnostics and device pickers.
pub fn list_input_devices() -> VoiceResult<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_stop_is_a_no_op() {
        let mut handle = CaptureHandle::detached();
        handle.stop();
        handle.stop();
    }

    #[test]
    fn stop_signals_thread_once() {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let thread = std::thread::spawn(move || {
            stop_rx.recv().unwrap();
        });
        let mut handle = CaptureHandle::new(stop_tx, thread);
        handle.stop();
        // Second stop finds the sender already taken.
        handle.stop();
    }
}
