//! Post-call summaries.
//!
//! After teardown the session hands the finished transcript to a
//! [`SummaryGenerator`] on an isolated task. A summary failure is logged and
//! swallowed; it never affects the teardown result.

use crate::error::{VoiceError, VoiceResult};
use crate::transcript::TranscriptTurn;
use crate::wire::Speaker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

/// When the session started and ended.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn summarize(
        &self,
        turns: &[TranscriptTurn],
        timing: &SessionTiming,
    ) -> VoiceResult<String>;
}

/// Local summary built from the transcript itself, used when no summary
/// service is configured.
#[derive(Default)]
pub struct PlaceholderSummary;

#[async_trait]
impl SummaryGenerator for PlaceholderSummary {
    async fn summarize(
        &self,
        turns: &[TranscriptTurn],
        timing: &SessionTiming,
    ) -> VoiceResult<String> {
        let caller_turns = turns.iter().filter(|t| t.speaker == Speaker::User).count();
        let duration = (timing.ended_at - timing.started_at).num_seconds().max(0);
        Ok(format!(
            "(voice) Call lasted {}s with {} caller turns across {} total.",
            duration,
            caller_turns,
            turns.len()
        ))
    }
}

/// Summary via a chat-completions service.
pub struct HttpSummary {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HttpSummary {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from `CARELINE_SUMMARY_URL`, `CARELINE_SUMMARY_KEY` and
    /// `CARELINE_SUMMARY_MODEL`. Returns None when no URL is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CARELINE_SUMMARY_URL").ok()?;
        let api_key = std::env::var("CARELINE_SUMMARY_KEY").ok();
        let model = std::env::var("CARELINE_SUMMARY_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self::new(base_url, api_key, model))
    }

    fn render_transcript(turns: &[TranscriptTurn]) -> String {
        turns
            .iter()
            .map(|turn| {
                let who = match turn.speaker {
                    Speaker::User => "Caller",
                    Speaker::Assistant => "Assistant",
                };
                format!("{}: {}", who, turn.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl SummaryGenerator for HttpSummary {
    async fn summarize(
        &self,
        turns: &[TranscriptTurn],
        timing: &SessionTiming,
    ) -> VoiceResult<String> {
        let transcript = Self::render_transcript(turns);
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Summarize this clinic phone call in two sentences: \
                                what the caller wanted and what was arranged."
                },
                {
                    "role": "user",
                    "content": format!(
                        "Call from {} to {}:\n{}",
                        timing.started_at.to_rfc3339(),
                        timing.ended_at.to_rfc3339(),
                        transcript
                    )
                }
            ]
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Summary(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VoiceError::Summary(format!(
                "summary service returned {}",
                response.status()
            )));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Summary(e.to_string()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| VoiceError::Summary("malformed summary response".to_string()))
    }
}
