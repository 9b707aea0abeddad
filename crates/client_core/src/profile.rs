use std::sync::Arc;

use shared::domain::{NeuroProfile, NeuroProfileId, ProfileSelection};
use tracing::info;

use crate::{
    error::{ClientError, ClientResult},
    gateway::LearningApi,
    session::Session,
};

pub const DYSLEXIA_PROFILE_NAME: &str = "dyslexia";

/// Maps the dyslexia switch onto catalog profile ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileMapping {
    enabled_id: NeuroProfileId,
    disabled_id: NeuroProfileId,
}

impl Default for ProfileMapping {
    fn default() -> Self {
        Self {
            enabled_id: NeuroProfileId(1),
            disabled_id: NeuroProfileId(0),
        }
    }
}

impl ProfileMapping {
    pub fn new(enabled_id: NeuroProfileId, disabled_id: NeuroProfileId) -> ClientResult<Self> {
        if enabled_id == disabled_id {
            return Err(ClientError::Config(format!(
                "enabled and disabled profile ids must differ (both are {enabled_id})"
            )));
        }
        Ok(Self {
            enabled_id,
            disabled_id,
        })
    }

    /// Resolves the enabled id from the catalog entry named `dyslexia`.
    pub fn from_catalog(
        profiles: &[NeuroProfile],
        disabled_id: NeuroProfileId,
    ) -> ClientResult<Self> {
        let profile = profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(DYSLEXIA_PROFILE_NAME))
            .ok_or_else(|| {
                ClientError::Config(format!(
                    "profile catalog has no '{DYSLEXIA_PROFILE_NAME}' entry"
                ))
            })?;
        Self::new(profile.id, disabled_id)
    }

    pub fn enabled_id(&self) -> NeuroProfileId {
        self.enabled_id
    }

    pub fn disabled_id(&self) -> NeuroProfileId {
        self.disabled_id
    }

    pub fn selection(&self, enabled: bool) -> ProfileSelection {
        ProfileSelection {
            enabled,
            profile_id: if enabled {
                self.enabled_id
            } else {
                self.disabled_id
            },
        }
    }
}

pub struct ProfileToggleController {
    api: Arc<dyn LearningApi>,
    mapping: ProfileMapping,
}

impl ProfileToggleController {
    pub fn new(api: Arc<dyn LearningApi>, mapping: ProfileMapping) -> Self {
        Self { api, mapping }
    }

    pub fn mapping(&self) -> ProfileMapping {
        self.mapping
    }

    pub async fn set_dyslexia_mode(
        &self,
        enabled: bool,
        session: &Session,
    ) -> ClientResult<ProfileSelection> {
        let token = session.require_token()?;
        let selection = self.mapping.selection(enabled);
        self.api
            .set_neuroprofile(selection.profile_id, token)
            .await?;
        info!(
            enabled,
            profile_id = selection.profile_id.0,
            "updated neuroprofile"
        );
        Ok(selection)
    }

    pub async fn list_profiles(&self, session: &Session) -> ClientResult<Vec<NeuroProfile>> {
        let token = session.require_token()?;
        self.api.list_neuroprofiles(token).await
    }

    /// Replaces the enabled id with the one the remote catalog reports,
    /// keeping the configured disabled id.
    pub async fn refresh_mapping_from_catalog(
        &mut self,
        session: &Session,
    ) -> ClientResult<ProfileMapping> {
        let profiles = self.list_profiles(session).await?;
        let mapping = ProfileMapping::from_catalog(&profiles, self.mapping.disabled_id)?;
        if mapping != self.mapping {
            info!(
                enabled_id = mapping.enabled_id.0,
                "resolved dyslexia profile from catalog"
            );
        }
        self.mapping = mapping;
        Ok(mapping)
    }
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;
