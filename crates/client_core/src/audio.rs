use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::{error::ClientResult, gateway::BinaryPayload};

/// Playable reference to synthesized speech, bound to the text that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    id: Uuid,
    content_type: String,
    bytes: Arc<[u8]>,
    source_text: String,
    created_at: DateTime<Utc>,
}

impl AudioArtifact {
    pub fn new(payload: BinaryPayload, source_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: payload.content_type,
            bytes: payload.bytes.into(),
            source_text: source_text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> String {
        format!("artifact:{}", self.id)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// File extension matching the declared audio type.
    pub fn file_extension(&self) -> &'static str {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "audio/flac" | "audio/x-flac" => "flac",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            _ => "bin",
        }
    }
}

impl std::fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Owns the lifetime of audio handles handed to the player.
pub trait ArtifactRegistry: Send + Sync {
    fn create(&self, payload: BinaryPayload, source_text: &str) -> ClientResult<AudioArtifact>;
    fn release(&self, artifact: &AudioArtifact);
}

#[derive(Default)]
pub struct InMemoryArtifacts {
    live: Mutex<HashSet<Uuid>>,
}

impl InMemoryArtifacts {
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_live(&self, artifact: &AudioArtifact) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&artifact.id)
    }
}

impl ArtifactRegistry for InMemoryArtifacts {
    fn create(&self, payload: BinaryPayload, source_text: &str) -> ClientResult<AudioArtifact> {
        let artifact = AudioArtifact::new(payload, source_text);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.id);
        debug!(artifact = %artifact.url(), bytes = artifact.bytes.len(), "created audio artifact");
        Ok(artifact)
    }

    fn release(&self, artifact: &AudioArtifact) {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&artifact.id);
        if removed {
            debug!(artifact = %artifact.url(), "released audio artifact");
        }
    }
}
