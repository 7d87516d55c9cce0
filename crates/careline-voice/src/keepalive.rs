//! Keep-alive ticker.
//!
//! Long silences from the caller would otherwise let intermediaries drop the
//! connection. Every interval the ticker pushes a short silence frame
//! through the normal outbound queue, so it interleaves with real traffic
//! instead of racing it. Idle and Closing phases are skipped.

use crate::state::Phase;
use crate::wire::OutboundMessage;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::trace;

const SILENCE_FRAME_MS: u64 = 100;

pub struct KeepAliveTicker {
    task: JoinHandle<()>,
}

impl KeepAliveTicker {
    pub fn start(
        interval: Duration,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        phase_rx: watch::Receiver<Phase>,
        sample_rate: u32,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                match *phase_rx.borrow() {
                    Phase::Idle | Phase::Closing => continue,
                    _ => {}
                }
                trace!("sending keep-alive silence frame");
                if outbound
                    .send(OutboundMessage::silence(SILENCE_FRAME_MS, sample_rate))
                    .is_err()
                {
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for KeepAliveTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
