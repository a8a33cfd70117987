//! Per-user provider settings and the store port that persists them.

mod sqlite;

use std::fmt;

use async_trait::async_trait;

use crate::{domain::UserId, Result};

pub use sqlite::SqliteSettingsStore;

/// Provider settings for one user. Any field may be unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub system_prompt: Option<String>,
}

impl UserSettings {
    /// No row exists, or every field is unset.
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.base_url.is_none()
            && self.model_name.is_none()
            && self.system_prompt.is_none()
    }

    /// API key and model name are both present, so a request may be dispatched.
    pub fn is_ready(&self) -> bool {
        self.api_key.is_some() && self.model_name.is_some()
    }

    pub fn get(&self, key: SettingKey) -> Option<&str> {
        match key {
            SettingKey::ApiKey => self.api_key.as_deref(),
            SettingKey::BaseUrl => self.base_url.as_deref(),
            SettingKey::ModelName => self.model_name.as_deref(),
            SettingKey::SystemPrompt => self.system_prompt.as_deref(),
        }
    }

    /// Blank strings are treated as unset.
    pub(crate) fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }
        Self {
            api_key: clean(self.api_key),
            base_url: clean(self.base_url),
            model_name: clean(self.model_name),
            system_prompt: clean(self.system_prompt),
        }
    }
}

impl fmt::Debug for UserSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

/// The closed set of user-writable settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ApiKey,
    BaseUrl,
    ModelName,
    SystemPrompt,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::ApiKey,
        SettingKey::BaseUrl,
        SettingKey::ModelName,
        SettingKey::SystemPrompt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::ApiKey => "api_key",
            SettingKey::BaseUrl => "base_url",
            SettingKey::ModelName => "model_name",
            SettingKey::SystemPrompt => "system_prompt",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// Keyed record store for [`UserSettings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns all-unset settings when the user has never configured anything.
    async fn get_user_settings(&self, user_id: UserId) -> Result<UserSettings>;

    async fn set_user_setting(&self, user_id: UserId, key: SettingKey, value: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let s = UserSettings {
            api_key: Some("sk-secret".into()),
            model_name: Some("gpt-4o".into()),
            ..Default::default()
        };
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
        assert!(dbg.contains("gpt-4o"));
    }

    #[test]
    fn readiness_needs_key_and_model() {
        let mut s = UserSettings::default();
        assert!(s.is_empty());
        assert!(!s.is_ready());
        s.api_key = Some("k".into());
        assert!(!s.is_ready());
        s.model_name = Some("m".into());
        assert!(s.is_ready());
    }

    #[test]
    fn blank_values_normalize_to_unset() {
        let s = UserSettings {
            api_key: Some("  ".into()),
            base_url: Some(String::new()),
            model_name: Some("m".into()),
            system_prompt: None,
        }
        .normalized();
        assert_eq!(s.api_key, None);
        assert_eq!(s.base_url, None);
        assert_eq!(s.get(SettingKey::ModelName), Some("m"));
    }
}
