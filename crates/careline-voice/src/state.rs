//! Session phase machine.
//!
//! All phase changes go through [`transition`], a pure function, so the
//! reachable state space is testable without audio hardware or a network.
//! The live machine publishes phases through a `watch` channel that the
//! keep-alive ticker and callers observe.

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle phase of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session resources held.
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Connected, mic streaming, no assistant audio pending.
    Listening,
    /// The endpoint is working (tool calls or text before audio arrives).
    Processing,
    /// Assistant audio is scheduled or playing.
    Speaking,
    /// Hang-up requested; waiting for scheduled playback to finish.
    Draining,
    /// Teardown in progress.
    Closing,
}

/// Inputs that drive phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StartRequested,
    TransportOpen,
    AudioChunkReceived,
    OutputTranscript,
    ToolCallsReceived,
    PlaybackDrained,
    Interrupted,
    HangUpRequested,
    StopRequested,
    TransportFailed,
    TeardownComplete,
}

/// Why a session ended. Stable codes, suitable for logs and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HangUp,
    UserStop,
    TransportError,
    PermissionDenied,
    Timeout,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::HangUp => "hang_up",
            StopReason::UserStop => "user_stop",
            StopReason::TransportError => "transport_error",
            StopReason::PermissionDenied => "permission_denied",
            StopReason::Timeout => "timeout",
        }
    }
}

/// Pure transition function. Unlisted combinations keep the current phase.
pub fn transition(phase: Phase, event: &SessionEvent) -> Phase {
    use Phase::*;
    use SessionEvent::*;
    match (phase, event) {
        (Idle, StartRequested) => Connecting,
        (Connecting, TransportOpen) => Listening,

        (Listening | Processing | Speaking, AudioChunkReceived) => Speaking,
        (Listening, OutputTranscript | ToolCallsReceived) => Processing,

        (Speaking, PlaybackDrained) => Listening,
        (Speaking, Interrupted) => Listening,

        (Listening | Processing | Speaking, HangUpRequested) => Draining,

        (Idle, _) => Idle,
        (Closing, TeardownComplete) => Idle,
        (_, StopRequested | TransportFailed) => Closing,

        (current, _) => current,
    }
}

/// Phase machine with published state.
#[derive(Clone)]
pub struct SessionStateMachine {
    tx: Arc<watch::Sender<Phase>>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// Apply an event and return the resulting phase.
    pub fn apply(&self, event: SessionEvent) -> Phase {
        let mut next = Phase::Idle;
        self.tx.send_modify(|phase| {
            *phase = transition(*phase, &event);
            next = *phase;
        });
        next
    }

    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Subscribe to phase changes.
    pub fn watch(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_speaking_and_back() {
        let mut phase = Phase::Idle;
        for (event, expected) in [
            (SessionEvent::StartRequested, Phase::Connecting),
            (SessionEvent::TransportOpen, Phase::Listening),
            (SessionEvent::AudioChunkReceived, Phase::Speaking),
            (SessionEvent::AudioChunkReceived, Phase::Speaking),
            (SessionEvent::PlaybackDrained, Phase::Listening),
        ] {
            phase = transition(phase, &event);
            assert_eq!(phase, expected, "after {:?}", event);
        }
    }

    #[test]
    fn interruption_returns_to_listening() {
        let phase = transition(Phase::Speaking, &SessionEvent::Interrupted);
        assert_eq!(phase, Phase::Listening);
    }

    #[test]
    fn tool_calls_mark_processing() {
        let phase = transition(Phase::Listening, &SessionEvent::ToolCallsReceived);
        assert_eq!(phase, Phase::Processing);
        // Audio after the tool round trip moves straight to Speaking.
        assert_eq!(
            transition(phase, &SessionEvent::AudioChunkReceived),
            Phase::Speaking
        );
    }

    #[test]
    fn hang_up_drains_from_any_active_phase() {
        for phase in [Phase::Listening, Phase::Processing, Phase::Speaking] {
            assert_eq!(
                transition(phase, &SessionEvent::HangUpRequested),
                Phase::Draining
            );
        }
    }

    #[test]
    fn stop_and_teardown_return_to_idle() {
        let phase = transition(Phase::Speaking, &SessionEvent::StopRequested);
        assert_eq!(phase, Phase::Closing);
        assert_eq!(transition(phase, &SessionEvent::TeardownComplete), Phase::Idle);
    }

    #[test]
    fn idle_ignores_stray_events() {
        for event in [
            SessionEvent::AudioChunkReceived,
            SessionEvent::Interrupted,
            SessionEvent::TransportFailed,
            SessionEvent::TeardownComplete,
        ] {
            assert_eq!(transition(Phase::Idle, &event), Phase::Idle);
        }
    }

    #[test]
    fn machine_publishes_phases() {
        let machine = SessionStateMachine::new();
        let rx = machine.watch();
        assert_eq!(machine.phase(), Phase::Idle);
        machine.apply(SessionEvent::StartRequested);
        machine.apply(SessionEvent::TransportOpen);
        assert_eq!(*rx.borrow(), Phase::Listening);
    }
}
