//! WebSocket transport to the conversational endpoint.
//!
//! One writer task owns the sink and drains the shared outbound queue, so
//! capture frames, tool results and keep-alive silence can never interleave
//! mid-message. One reader task parses inbound events and watches for
//! inactivity; everything it produces, including synthetic close events,
//! arrives on a single channel the session engine consumes.

use crate::config::SessionConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::wire::{InboundEvent, OutboundMessage, SessionDeclaration, SessionDescriptor};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

/// Connects a session to its remote endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        config: &SessionConfig,
        tool_schemas: Vec<serde_json::Value>,
    ) -> VoiceResult<TransportHandle>;
}

/// A live connection: the outbound queue in, the event stream out.
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    events: Option<mpsc::UnboundedReceiver<InboundEvent>>,
    close_tx: Option<oneshot::Sender<()>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Handle over plain channels, with no tasks behind it. Used by
    /// in-memory transports in tests.
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        events: mpsc::UnboundedReceiver<InboundEvent>,
    ) -> Self {
        Self {
            outbound,
            events: Some(events),
            close_tx: None,
            writer: None,
            reader: None,
        }
    }

    /// Sender for the single outbound queue. Cloneable; every producer in
    /// the session shares this one queue.
    pub fn sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.outbound.clone()
    }

    /// The inbound event stream. Yields `None` forever after the first take.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
        self.events.take()
    }

    /// Close the connection. The writer sends a close frame before exiting;
    /// the reader is cancelled.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer.take();
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Production transport over tokio-tungstenite.
#[derive(Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        config: &SessionConfig,
        tool_schemas: Vec<serde_json::Value>,
    ) -> VoiceResult<TransportHandle> {
        let mut request = config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| VoiceError::Transport(format!("invalid endpoint: {}", e)))?;
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| VoiceError::Transport(format!("invalid api key: {}", e)))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (mut ws, _) = connect_async(request)
            .await
            .map_err(|e| VoiceError::Transport(format!("connect failed: {}", e)))?;
        info!(endpoint = %config.endpoint, "connected to realtime endpoint");

        // Declare the session before any audio flows.
        let declaration = SessionDeclaration {
            session: SessionDescriptor {
                modality: "audio".to_string(),
                voice: config.voice.clone(),
                transcription: true,
                instructions: config.instructions.clone(),
                tools: tool_schemas,
            },
        };
        let text = serde_json::to_string(&declaration)
            .map_err(|e| VoiceError::Transport(format!("declaration encode: {}", e)))?;
        ws.send(Message::Text(text))
            .await
            .map_err(|e| VoiceError::Transport(format!("declaration send: {}", e)))?;

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<InboundEvent>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(err) => {
                                warn!(error = %err, "dropping unserializable outbound message");
                                continue;
                            }
                        };
                        if let Err(err) = ws_tx.send(Message::Text(text)).await {
                            warn!(error = %err, "outbound send failed");
                            break;
                        }
                    }
                    _ = &mut close_rx => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("transport writer exited");
        });

        let inactivity_tolerance = config.inactivity_tolerance;
        let reader = tokio::spawn(async move {
            let mut last_activity = tokio::time::Instant::now();
            let mut idle_check = tokio::time::interval(Duration::from_secs(1));
            idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    message = ws_rx.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                last_activity = tokio::time::Instant::now();
                                match serde_json::from_str::<InboundEvent>(&text) {
                                    Ok(event) => {
                                        if event_tx.send(event).is_err() {
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "unrecognized inbound message");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let (code, reason) = frame
                                    .map(|f| (Some(u16::from(f.code)), Some(f.reason.to_string())))
                                    .unwrap_or((None, None));
                                let _ = event_tx.send(InboundEvent::Closed {
                                    closed: crate::wire::ClosePayload { code, reason },
                                });
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ping/pong and binary frames still count as life.
                                last_activity = tokio::time::Instant::now();
                            }
                            Some(Err(err)) => {
                                let _ = event_tx.send(InboundEvent::Error {
                                    error: format!("transport read: {}", err),
                                });
                                break;
                            }
                            None => {
                                let _ = event_tx.send(InboundEvent::closed(None, "stream ended"));
                                break;
                            }
                        }
                    }
                    _ = idle_check.tick() => {
                        if last_activity.elapsed() > inactivity_tolerance {
                            warn!(?inactivity_tolerance, "no inbound traffic, closing");
                            let _ = event_tx.send(InboundEvent::closed(None, "inactivity timeout"));
                            break;
                        }
                    }
                }
            }
            debug!("transport reader exited");
        });

        Ok(TransportHandle {
            outbound: outbound_tx,
            events: Some(event_rx),
            close_tx: Some(close_tx),
            writer: Some(writer),
            reader: Some(reader),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_handle_round_trips() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(out_tx, event_rx);

        handle
            .sender()
            .send(OutboundMessage::silence(100, 16000))
            .unwrap();
        assert!(out_rx.recv().await.is_some());

        event_tx
            .send(InboundEvent::closed(Some(1000), "bye"))
            .unwrap();
        let mut events = handle.take_events().unwrap();
        assert!(matches!(
            events.recv().await,
            Some(InboundEvent::Closed { .. })
        ));

        // Events can only be taken once.
        assert!(handle.take_events().is_none());
        handle.close();
    }
}
