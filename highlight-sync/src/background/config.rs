// User-facing configuration persisted in the key-value store
// Each field lives under its own key, so concurrent saves of different fields never clobber each other

use super::persistence::{
    KeyValueStore, KEY_API_URL, KEY_EXTENSION_ENABLED, KEY_PROJECT_ID, KEY_TOKEN,
};
use crate::error::StoreError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub api_url: String,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub extension_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            project_id: None,
            extension_enabled: true,
        }
    }
}

impl Config {
    /// Absolute URL for an API path, tolerating a trailing `/` on `api_url`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref().filter(|p| !p.is_empty())
    }
}

/// Partial update sent with `saveConfig`.
///
/// Absent fields are left alone. `token` and `projectId` may be sent as
/// `null` to clear them, so they are double options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_enabled: Option<bool>,
}

/// Distinguishes an explicit `null` (Some(None)) from an absent field (None).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ConfigPatch {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(Some(project_id.into())),
            ..Self::default()
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(Some(token.into())),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Reads and writes [`Config`] through the shared store.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the current configuration, filling defaults for unset keys.
    /// Values of the wrong type are treated as unset.
    pub fn load(&self) -> Result<Config, StoreError> {
        let defaults = Config::default();
        Ok(Config {
            api_url: self
                .read_string(KEY_API_URL)?
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.api_url),
            token: self.read_string(KEY_TOKEN)?,
            project_id: self.read_string(KEY_PROJECT_ID)?,
            extension_enabled: self
                .store
                .get(KEY_EXTENSION_ENABLED)?
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.extension_enabled),
        })
    }

    /// Apply a partial update, key by key.
    pub fn apply(&self, patch: &ConfigPatch) -> Result<(), StoreError> {
        if let Some(api_url) = &patch.api_url {
            self.store.set(KEY_API_URL, Value::from(api_url.as_str()))?;
        }
        if let Some(token) = &patch.token {
            self.write_optional(KEY_TOKEN, token.as_deref())?;
        }
        if let Some(project_id) = &patch.project_id {
            self.write_optional(KEY_PROJECT_ID, project_id.as_deref())?;
        }
        if let Some(enabled) = patch.extension_enabled {
            self.store.set(KEY_EXTENSION_ENABLED, Value::from(enabled))?;
        }
        Ok(())
    }

    fn read_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(key)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    fn write_optional(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        match value {
            Some(v) => self.store.set(key, Value::from(v)),
            None => self.store.remove(key),
        }
    }
}
