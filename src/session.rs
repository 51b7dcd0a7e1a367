use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::address::Address;
use crate::message::forward::ForwardEnvelope;
use crate::message::UnifiedMessage;

/// What kind of place a scene is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    Private,
    Group,
    /// A guild/server that contains channels. Not a send target itself.
    Guild,
    Channel,
}

/// A group or channel reachable by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub kind: SceneKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<Box<Scene>>,
}

impl Scene {
    pub fn group(id: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            kind: SceneKind::Group,
            name: None,
            parent: None,
        }
    }

    pub fn channel(id: impl ToString, guild_id: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            kind: SceneKind::Channel,
            name: None,
            parent: Some(Box::new(Scene {
                id: guild_id.to_string(),
                kind: SceneKind::Guild,
                name: None,
                parent: None,
            })),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind == SceneKind::Group
    }

    pub fn is_channel(&self) -> bool {
        self.kind == SceneKind::Channel
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref().map(|p| p.id.as_str())
    }
}

/// Narrows scene enumeration. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneFilter {
    pub kinds: Vec<SceneKind>,
    pub parent_id: Option<String>,
}

impl SceneFilter {
    /// Groups and channels: the scenes a broadcast can reach.
    pub fn broadcastable() -> Self {
        Self {
            kinds: vec![SceneKind::Group, SceneKind::Channel],
            parent_id: None,
        }
    }

    pub fn matches(&self, scene: &Scene) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&scene.kind))
            && self
                .parent_id
                .as_deref()
                .map_or(true, |parent| scene.parent_id() == Some(parent))
    }
}

/// A member of a group or a friend of the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub name: String,
    /// Group card or remark.
    #[serde(default)]
    pub card: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub join_time: Option<i64>,
}

/// What a session is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(UnifiedMessage),
    Forward(ForwardEnvelope),
}

/// Transport acknowledgement for one send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub message_ids: Vec<String>,
}

/// A connected bot on one platform.
#[async_trait]
pub trait Session: Send + Sync {
    /// The bot's own account id on its platform.
    fn self_id(&self) -> &str;

    /// Raw platform scope reported by the adapter (e.g. "QQClient", "Kaiheila").
    fn scope(&self) -> Option<String>;

    async fn scenes(&self, filter: &SceneFilter) -> Result<Vec<Scene>>;

    async fn members(&self, group_id: &str) -> Result<Vec<UserData>>;

    async fn send(&self, address: &Address, message: &Outbound) -> Result<Receipt>;
}

/// The set of currently connected sessions, keyed by self id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<BTreeMap<String, Arc<dyn Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, session: Arc<dyn Session>) {
        let id = session.self_id().to_string();
        info!("Session connected: {}", id);
        self.sessions.write().await.insert(id, session);
    }

    pub async fn disconnect(&self, self_id: &str) -> Option<Arc<dyn Session>> {
        let removed = self.sessions.write().await.remove(self_id);
        if removed.is_some() {
            info!("Session disconnected: {}", self_id);
        }
        removed
    }

    pub async fn get(&self, self_id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.read().await.get(self_id).cloned()
    }

    /// Every connected session, ordered by self id.
    pub async fn connected(&self) -> Vec<Arc<dyn Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
