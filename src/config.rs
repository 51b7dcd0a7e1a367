use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::broadcast::BroadcastSettings;
use crate::session::SceneKind;

/// A group/channel id as written in config. TOML users write both `123` and
/// `"123"`; both end up as the same canonical string.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum IdValue {
    Int(i64),
    Str(String),
}

impl IdValue {
    pub fn canonical(&self) -> String {
        match self {
            IdValue::Int(n) => n.to_string(),
            IdValue::Str(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    /// Label attached to every log line of a broadcast.
    #[serde(default)]
    pub label: Option<String>,
    /// Default platform restriction ("qq", "dodo" or "kaiheila").
    #[serde(default)]
    pub platform: Option<String>,
    /// Groups and channels never broadcast to.
    #[serde(default)]
    pub ignore: Vec<IdValue>,
    #[serde(default = "default_enumeration_timeout")]
    pub enumeration_timeout_secs: u64,
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_secs: u64,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub chats: Vec<TelegramChatConfig>,
}

/// Telegram offers no "list my chats" call, so reachable chats are declared.
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramChatConfig {
    pub id: i64,
    #[serde(default = "default_chat_kind")]
    pub kind: SceneKind,
    #[serde(default)]
    pub title: Option<String>,
}

fn default_enumeration_timeout() -> u64 {
    30
}

fn default_gate_timeout() -> u64 {
    10
}

fn default_dispatch_timeout() -> u64 {
    60
}

fn default_chat_kind() -> SceneKind {
    SceneKind::Group
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            label: None,
            platform: None,
            ignore: Vec::new(),
            enumeration_timeout_secs: default_enumeration_timeout(),
            gate_timeout_secs: default_gate_timeout(),
            dispatch_timeout_secs: default_dispatch_timeout(),
        }
    }
}

impl BroadcastConfig {
    pub fn ignore_set(&self) -> HashSet<String> {
        self.ignore
            .iter()
            .map(IdValue::canonical)
            .filter(|id| !id.is_empty())
            .collect()
    }

    pub fn settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            label: self.label.clone(),
            platform: self.platform.clone(),
            ignore: self.ignore_set(),
            enumeration_timeout: Duration::from_secs(self.enumeration_timeout_secs),
            gate_timeout: Duration::from_secs(self.gate_timeout_secs),
            dispatch_timeout: Duration::from_secs(self.dispatch_timeout_secs),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.telegram.is_none());
        let settings = config.broadcast.settings();
        assert_eq!(settings.dispatch_timeout, Duration::from_secs(60));
        assert_eq!(settings.enumeration_timeout, Duration::from_secs(30));
        assert!(settings.ignore.is_empty());
    }

    #[test]
    fn test_ignore_ids_accept_ints_and_strings() {
        let config = Config::from_toml_str(
            r#"
            [broadcast]
            label = "daily"
            platform = "qq"
            ignore = [123456, "654321", " 42 "]
            dispatch_timeout_secs = 5
            "#,
        )
        .unwrap();

        let ignore = config.broadcast.ignore_set();
        assert!(ignore.contains("123456"));
        assert!(ignore.contains("654321"));
        assert!(ignore.contains("42"));
        let settings = config.broadcast.settings();
        assert_eq!(settings.label.as_deref(), Some("daily"));
        assert_eq!(settings.dispatch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_telegram_section() {
        let config = Config::from_toml_str(
            r#"
            [telegram]
            bot_token = "123:abc"

            [[telegram.chats]]
            id = -1001

            [[telegram.chats]]
            id = -1002
            kind = "channel"
            title = "announcements"
            "#,
        )
        .unwrap();

        let telegram = config.telegram.unwrap();
        assert_eq!(telegram.chats.len(), 2);
        assert_eq!(telegram.chats[0].kind, SceneKind::Group);
        assert_eq!(telegram.chats[1].kind, SceneKind::Channel);
        assert_eq!(telegram.chats[1].title.as_deref(), Some("announcements"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/broadcast.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[broadcast]\nignore = [1]\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.broadcast.ignore_set().contains("1"));
    }
}
