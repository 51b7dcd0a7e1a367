use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::address::Address;
use crate::session::{Outbound, Receipt, Scene, SceneFilter, Session, UserData};

/// In-memory session that records every send.
pub struct MockSession {
    self_id: String,
    scope: Option<String>,
    scenes: Vec<Scene>,
    fail_enumeration: bool,
    fail_targets: HashSet<String>,
    send_delay: Option<Duration>,
    scenes_delay: Option<Duration>,
    sent: Mutex<Vec<(Address, Outbound)>>,
    enumerations: Mutex<usize>,
}

impl MockSession {
    pub fn new(self_id: &str, scope: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            scope: Some(scope.to_string()),
            scenes: Vec::new(),
            fail_enumeration: false,
            fail_targets: HashSet::new(),
            send_delay: None,
            scenes_delay: None,
            sent: Mutex::new(Vec::new()),
            enumerations: Mutex::new(0),
        }
    }

    pub fn without_scope(self_id: &str) -> Self {
        let mut session = Self::new(self_id, "");
        session.scope = None;
        session
    }

    pub fn with_scenes(mut self, scenes: Vec<Scene>) -> Self {
        self.scenes = scenes;
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Sends whose target id equals `target_id` fail.
    pub fn failing_send_to(mut self, target_id: &str) -> Self {
        self.fail_targets.insert(target_id.to_string());
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn with_scenes_delay(mut self, delay: Duration) -> Self {
        self.scenes_delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<dyn Session> {
        Arc::new(self)
    }

    pub async fn sent(&self) -> Vec<(Address, Outbound)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_targets(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(a, _)| a.target_id().to_string())
            .collect()
    }

    pub async fn enumerations(&self) -> usize {
        *self.enumerations.lock().await
    }
}

#[async_trait]
impl Session for MockSession {
    fn self_id(&self) -> &str {
        &self.self_id
    }

    fn scope(&self) -> Option<String> {
        self.scope.clone()
    }

    async fn scenes(&self, filter: &SceneFilter) -> Result<Vec<Scene>> {
        *self.enumerations.lock().await += 1;
        if let Some(delay) = self.scenes_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_enumeration {
            bail!("scene listing unavailable");
        }
        Ok(self
            .scenes
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn members(&self, group_id: &str) -> Result<Vec<UserData>> {
        Ok(vec![UserData {
            name: "member".into(),
            card: None,
            user_id: "u1".into(),
            group_id: Some(group_id.to_string()),
            role: Some("member".into()),
            avatar_url: None,
            join_time: None,
        }])
    }

    async fn send(&self, address: &Address, message: &Outbound) -> Result<Receipt> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_targets.contains(address.target_id()) {
            bail!("remote rejected message to {}", address);
        }
        let mut sent = self.sent.lock().await;
        sent.push((address.clone(), message.clone()));
        Ok(Receipt {
            message_ids: vec![format!("{}-{}", self.self_id, sent.len())],
        })
    }
}
