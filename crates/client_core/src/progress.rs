use std::sync::Arc;

use shared::protocol::{ProgressEntry, ProgressRecord};
use tracing::info;

use crate::{error::ClientResult, gateway::LearningApi, session::Session};

/// Records learning progress against the signed-in account.
pub struct ProgressLog {
    api: Arc<dyn LearningApi>,
}

impl ProgressLog {
    pub fn new(api: Arc<dyn LearningApi>) -> Self {
        Self { api }
    }

    pub async fn record(&self, entry: &ProgressEntry, session: &Session) -> ClientResult<()> {
        let token = session.require_token()?;
        self.api.save_progress(entry, token).await?;
        info!(content_id = %entry.content_id, status = %entry.status, "recorded progress");
        Ok(())
    }

    pub async fn history(&self, session: &Session) -> ClientResult<Vec<ProgressRecord>> {
        let token = session.require_token()?;
        self.api.my_analytics(token).await
    }
}
