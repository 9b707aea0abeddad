//! Adapt-then-speak pipeline.
//!
//! Adaptation and speech each run a small state machine
//! (`Idle -> Adapting|Synthesizing -> Idle|Failed`). Calls may overlap; held
//! state only changes once a call settles. Settlements are applied one at a
//! time under the state lock, so for adaptation the call that settles last
//! owns the held result, whatever order the calls were issued in. The held
//! source text always belongs to the held result.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{ArtifactRegistry, AudioArtifact},
    error::ClientResult,
    gateway::LearningApi,
    session::Session,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptPhase {
    Idle,
    Adapting,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechPhase {
    Idle,
    Synthesizing,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationResult {
    /// Text the call was issued with.
    pub source_text: String,
    pub adapted_text: String,
    pub original_text: Option<String>,
    /// Issue order of the call that produced this result.
    pub issued_seq: u64,
    /// Settlement order of the call that produced this result.
    pub resolved_seq: u64,
}

/// Picks the text to synthesize: adapted output when there is any, else the source.
pub fn speech_input<'a>(adapted_text: Option<&'a str>, source_text: &'a str) -> &'a str {
    match adapted_text {
        Some(adapted) if !adapted.is_empty() => adapted,
        _ => source_text,
    }
}

#[derive(Default)]
struct OrchestratorState {
    result: Option<AdaptationResult>,
    audio: Option<AudioArtifact>,
    adapt_inflight: usize,
    adapt_error: Option<String>,
    speech_inflight: usize,
    speech_error: Option<String>,
    issued_seq: u64,
    resolved_seq: u64,
}

pub struct AdaptationOrchestrator {
    api: Arc<dyn LearningApi>,
    artifacts: Arc<dyn ArtifactRegistry>,
    state: Mutex<OrchestratorState>,
}

impl AdaptationOrchestrator {
    pub fn new(api: Arc<dyn LearningApi>, artifacts: Arc<dyn ArtifactRegistry>) -> Self {
        Self {
            api,
            artifacts,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    pub async fn adapt(
        &self,
        source_text: &str,
        session: &Session,
    ) -> ClientResult<AdaptationResult> {
        let token = session.require_token()?;

        let issued_seq = {
            let mut state = self.state.lock().await;
            state.adapt_inflight += 1;
            state.issued_seq += 1;
            state.issued_seq
        };
        debug!(issued_seq, chars = source_text.len(), "adaptation requested");

        let outcome = self.api.adapt_content(source_text, token).await;

        let mut state = self.state.lock().await;
        state.adapt_inflight = state.adapt_inflight.saturating_sub(1);
        state.resolved_seq += 1;
        let resolved_seq = state.resolved_seq;

        match outcome {
            Ok(response) => {
                let result = AdaptationResult {
                    source_text: source_text.to_string(),
                    adapted_text: response.adapted_text,
                    original_text: response.original_text,
                    issued_seq,
                    resolved_seq,
                };
                state.result = Some(result.clone());
                state.adapt_error = None;
                info!(issued_seq, resolved_seq, "adaptation applied");
                Ok(result)
            }
            Err(err) => {
                warn!(issued_seq, resolved_seq, error = %err, "adaptation failed");
                state.adapt_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Synthesizes the adapted text when one is held, else `source_text`.
    pub async fn speak(&self, source_text: &str, session: &Session) -> ClientResult<AudioArtifact> {
        let token = session.require_token()?;

        let text = {
            let mut state = self.state.lock().await;
            state.speech_inflight += 1;
            speech_input(
                state.result.as_ref().map(|r| r.adapted_text.as_str()),
                source_text,
            )
            .to_string()
        };
        debug!(chars = text.len(), "speech synthesis requested");

        let outcome = match self.api.text_to_speech(&text, token).await {
            Ok(payload) => self.artifacts.create(payload, &text),
            Err(err) => Err(err),
        };

        let mut state = self.state.lock().await;
        state.speech_inflight = state.speech_inflight.saturating_sub(1);
        match outcome {
            Ok(artifact) => {
                if let Some(previous) = state.audio.replace(artifact.clone()) {
                    self.artifacts.release(&previous);
                }
                state.speech_error = None;
                info!(artifact = %artifact.url(), "speech synthesized");
                Ok(artifact)
            }
            Err(err) => {
                warn!(error = %err, "speech synthesis failed");
                state.speech_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Drops the held adaptation and releases the current audio handle.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.result = None;
        state.adapt_error = None;
        state.speech_error = None;
        if let Some(previous) = state.audio.take() {
            self.artifacts.release(&previous);
        }
    }

    pub async fn is_loading(&self) -> bool {
        let state = self.state.lock().await;
        state.adapt_inflight + state.speech_inflight > 0
    }

    pub async fn adapt_phase(&self) -> AdaptPhase {
        let state = self.state.lock().await;
        if state.adapt_inflight > 0 {
            AdaptPhase::Adapting
        } else if let Some(message) = &state.adapt_error {
            AdaptPhase::Failed(message.clone())
        } else {
            AdaptPhase::Idle
        }
    }

    pub async fn speech_phase(&self) -> SpeechPhase {
        let state = self.state.lock().await;
        if state.speech_inflight > 0 {
            SpeechPhase::Synthesizing
        } else if let Some(message) = &state.speech_error {
            SpeechPhase::Failed(message.clone())
        } else {
            SpeechPhase::Idle
        }
    }

    pub async fn result(&self) -> Option<AdaptationResult> {
        self.state.lock().await.result.clone()
    }

    pub async fn adapted_text(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .result
            .as_ref()
            .map(|r| r.adapted_text.clone())
    }

    /// Source text of the held result; empty when nothing is held.
    pub async fn source_text(&self) -> String {
        self.state
            .lock()
            .await
            .result
            .as_ref()
            .map(|r| r.source_text.clone())
            .unwrap_or_default()
    }

    pub async fn audio(&self) -> Option<AudioArtifact> {
        self.state.lock().await.audio.clone()
    }
}

impl Drop for AdaptationOrchestrator {
    fn drop(&mut self) {
        if let Some(artifact) = self.state.get_mut().audio.take() {
            self.artifacts.release(&artifact);
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
