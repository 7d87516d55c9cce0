//! Wire shapes exchanged with the remote realtime endpoint.
//!
//! Every inbound frame parses into one tagged [`InboundEvent`] so that all
//! phase changes flow through a single transition function, and every
//! outbound frame is an [`OutboundMessage`] pushed through the single-writer
//! queue.

use crate::codec;
use serde::{Deserialize, Serialize};

/// Outbound audio payload: 16-bit LE PCM as base64 text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrameMessage {
    pub encoding: String,
    pub sample_rate_hz: u32,
    pub data: String,
}

/// Outbound tool result, correlated to its invocation by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultMessage {
    pub id: String,
    pub name: String,
    pub result: serde_json::Value,
}

/// A message sent to the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OutboundMessage {
    Audio {
        audio: AudioFrameMessage,
    },
    ToolResult {
        #[serde(rename = "toolResult")]
        tool_result: ToolResultMessage,
    },
}

impl OutboundMessage {
    /// Quantize and encode a captured frame for sending.
    pub fn audio_frame(samples: &[f32], sample_rate_hz: u32) -> Self {
        OutboundMessage::Audio {
            audio: AudioFrameMessage {
                encoding: "pcm16le".to_string(),
                sample_rate_hz,
                data: codec::encode_frame(samples),
            },
        }
    }

    /// A content-free keep-alive frame of zero samples.
    pub fn silence(duration_ms: u64, sample_rate_hz: u32) -> Self {
        let count = (sample_rate_hz as u64 * duration_ms / 1000) as usize;
        OutboundMessage::Audio {
            audio: AudioFrameMessage {
                encoding: "pcm16le".to_string(),
                sample_rate_hz,
                data: codec::encode_pcm16(&vec![0i16; count]),
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, result: serde_json::Value) -> Self {
        OutboundMessage::ToolResult {
            tool_result: ToolResultMessage {
                id: id.into(),
                name: name.into(),
                result,
            },
        }
    }

    /// Structured error payload for a failed or unknown tool invocation.
    pub fn tool_error(id: impl Into<String>, name: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self::tool_result(id, name, serde_json::json!({ "error": message.as_ref() }))
    }
}

/// Who produced a transcript fragment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// A partial or final piece of transcript text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptFragment {
    pub speaker: Speaker,
    pub text: String,
    pub partial: bool,
}

/// Synthesized audio from the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundAudio {
    pub sample_rate_hz: u32,
    pub data: String,
}

/// A tool invocation issued by the endpoint. Ids are assigned remotely and
/// are unique within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Close notification, either from the wire or synthesized locally (for
/// example by the inactivity watchdog).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClosePayload {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Everything the endpoint can send us, as one tagged event type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InboundEvent {
    Transcript {
        transcript: TranscriptFragment,
    },
    Audio {
        audio: InboundAudio,
    },
    ToolCalls {
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolInvocation>,
    },
    TurnComplete {
        #[serde(rename = "turnComplete")]
        turn_complete: bool,
    },
    Interrupted {
        interrupted: bool,
    },
    Closed {
        closed: ClosePayload,
    },
    Error {
        error: String,
    },
}

impl InboundEvent {
    pub fn closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        InboundEvent::Closed {
            closed: ClosePayload {
                code,
                reason: Some(reason.into()),
            },
        }
    }
}

/// Declared session configuration, sent once right after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDeclaration {
    pub session: SessionDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub modality: String,
    pub voice: String,
    pub transcription: bool,
    pub instructions: String,
    pub tools: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_audio_shape() {
        let msg = OutboundMessage::audio_frame(&[0.0f32; 16], 16000);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["audio"]["encoding"], "pcm16le");
        assert_eq!(value["audio"]["sampleRateHz"], 16000);
        assert!(value["audio"]["data"].is_string());
    }

    #[test]
    fn tool_result_shape() {
        let msg = OutboundMessage::tool_result("t1", "book_appointment", json!("SUCCESS"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["toolResult"]["id"], "t1");
        assert_eq!(value["toolResult"]["name"], "book_appointment");
        assert_eq!(value["toolResult"]["result"], "SUCCESS");
    }

    #[test]
    fn inbound_events_parse() {
        let ev: InboundEvent = serde_json::from_str(
            r#"{"transcript":{"speaker":"user","text":"hello","partial":true}}"#,
        )
        .unwrap();
        assert!(matches!(ev, InboundEvent::Transcript { .. }));

        let ev: InboundEvent =
            serde_json::from_str(r#"{"audio":{"sampleRateHz":24000,"data":"AAAA"}}"#).unwrap();
        assert!(matches!(ev, InboundEvent::Audio { audio } if audio.sample_rate_hz == 24000));

        let ev: InboundEvent = serde_json::from_str(r#"{"turnComplete":true}"#).unwrap();
        assert!(matches!(ev, InboundEvent::TurnComplete { .. }));

        let ev: InboundEvent = serde_json::from_str(r#"{"interrupted":true}"#).unwrap();
        assert!(matches!(ev, InboundEvent::Interrupted { .. }));

        let ev: InboundEvent = serde_json::from_str(
            r#"{"toolCalls":[{"id":"t1","name":"list_providers","args":{}}]}"#,
        )
        .unwrap();
        match ev {
            InboundEvent::ToolCalls { tool_calls } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].id, "t1");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let ev: InboundEvent =
            serde_json::from_str(r#"{"closed":{"code":1000,"reason":"bye"}}"#).unwrap();
        assert!(matches!(ev, InboundEvent::Closed { .. }));

        let ev: InboundEvent = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert!(matches!(ev, InboundEvent::Error { .. }));
    }

    #[test]
    fn tool_invocation_args_default_to_null() {
        let call: ToolInvocation = serde_json::from_str(r#"{"id":"t9","name":"hang_up"}"#).unwrap();
        assert!(call.args.is_null());
    }
}
