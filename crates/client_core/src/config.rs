use std::{collections::HashMap, fs, path::Path};

use shared::domain::NeuroProfileId;
use url::Url;

use crate::{
    error::{ClientError, ClientResult},
    profile::ProfileMapping,
};

pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub database_url: String,
    pub dyslexia_profile_id: i64,
    pub default_profile_id: i64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".into(),
            database_url: "sqlite://./data/client.db".into(),
            dyslexia_profile_id: 1,
            default_profile_id: 0,
        }
    }
}

impl ClientSettings {
    pub fn api_base_url(&self) -> ClientResult<Url> {
        let url = Url::parse(self.api_base_url.trim()).map_err(|e| {
            ClientError::Config(format!("invalid api base url '{}': {e}", self.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "api base url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn profile_mapping(&self) -> ClientResult<ProfileMapping> {
        ProfileMapping::new(
            NeuroProfileId(self.dyslexia_profile_id),
            NeuroProfileId(self.default_profile_id),
        )
    }

    pub fn normalized_database_url(&self) -> String {
        storage::normalize_database_url(&self.database_url, &Self::default().database_url)
    }
}

/// Defaults, then `client.toml`, then environment.
pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    if let Ok(raw) = fs::read_to_string(Path::new(SETTINGS_FILE)) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn apply_file_overrides(settings: &mut ClientSettings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };

    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("database_url").and_then(toml::Value::as_str) {
        settings.database_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("dyslexia_profile_id").and_then(toml_i64) {
        settings.dyslexia_profile_id = v;
    }
    if let Some(v) = file_cfg.get("default_profile_id").and_then(toml_i64) {
        settings.default_profile_id = v;
    }
}

fn toml_i64(value: &toml::Value) -> Option<i64> {
    match value {
        toml::Value::Integer(v) => Some(*v),
        toml::Value::String(v) => v.trim().parse().ok(),
        _ => None,
    }
}

pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("NEUROADAPT_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("NEUROADAPT_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(parsed) = lookup("APP__DYSLEXIA_PROFILE_ID").and_then(|v| v.parse().ok()) {
        settings.dyslexia_profile_id = parsed;
    }
    if let Some(parsed) = lookup("APP__DEFAULT_PROFILE_ID").and_then(|v| v.parse().ok()) {
        settings.default_profile_id = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
