use std::sync::Arc;

use storage::LocalStore;
use tracing::info;

pub mod audio;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod profile;
pub mod progress;
pub mod session;

#[cfg(test)]
mod test_support;

pub use audio::{ArtifactRegistry, AudioArtifact, InMemoryArtifacts};
pub use config::ClientSettings;
pub use error::{ClientError, ClientResult, TransportFailure};
pub use gateway::{ApiGateway, ApiPayload, BinaryPayload, LearningApi, RequestDescriptor};
pub use orchestrator::{AdaptPhase, AdaptationOrchestrator, AdaptationResult, SpeechPhase};
pub use profile::{ProfileMapping, ProfileToggleController};
pub use progress::ProgressLog;
pub use session::{InMemorySessionPersistence, Session, SessionPersistence, SessionStore};

/// Wires every component over one gateway.
pub struct LearningClient {
    pub session: SessionStore,
    pub adaptation: AdaptationOrchestrator,
    pub profiles: ProfileToggleController,
    pub progress: ProgressLog,
}

impl LearningClient {
    pub fn new(
        api: Arc<dyn LearningApi>,
        persistence: Arc<dyn SessionPersistence>,
        artifacts: Arc<dyn ArtifactRegistry>,
        mapping: ProfileMapping,
    ) -> Self {
        Self {
            session: SessionStore::new(Arc::clone(&api), persistence),
            adaptation: AdaptationOrchestrator::new(Arc::clone(&api), artifacts),
            profiles: ProfileToggleController::new(Arc::clone(&api), mapping),
            progress: ProgressLog::new(api),
        }
    }

    /// Builds the client from settings against the durable local store and
    /// restores any persisted session.
    pub async fn connect(settings: &ClientSettings) -> ClientResult<Self> {
        let database_url = settings.normalized_database_url();
        let store = LocalStore::new(&database_url)
            .await
            .map_err(|e| ClientError::Storage(format!("{e:#}")))?;
        Self::connect_with_persistence(settings, Arc::new(store)).await
    }

    pub async fn connect_with_persistence(
        settings: &ClientSettings,
        persistence: Arc<dyn SessionPersistence>,
    ) -> ClientResult<Self> {
        let base_url = settings.api_base_url()?;
        let mapping = settings.profile_mapping()?;
        let client = Self::new(
            Arc::new(ApiGateway::new(&base_url)),
            persistence,
            Arc::new(InMemoryArtifacts::default()),
            mapping,
        );
        let session = client.session.restore().await;
        info!(
            api = %base_url,
            signed_in = session.is_authenticated(),
            "learning client ready"
        );
        Ok(client)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
