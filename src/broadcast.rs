use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::address::{resolve_address, Address};
use crate::error::{Error, Result};
use crate::message::forward::ForwardEnvelope;
use crate::message::{build_message, UnifiedMessage};
use crate::platform::{resolve_platform, PlatformFilter, PlatformIdentity};
use crate::session::{Outbound, Receipt, Scene, SceneFilter, Session, SessionRegistry};

/// The content of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastMessage {
    Text(String),
    Unified(UnifiedMessage),
    Forward(ForwardEnvelope),
}

impl BroadcastMessage {
    pub fn is_empty(&self) -> bool {
        match self {
            BroadcastMessage::Text(text) => text.is_empty(),
            BroadcastMessage::Unified(message) => message.is_empty(),
            BroadcastMessage::Forward(envelope) => envelope.is_empty(),
        }
    }

    fn into_outbound(self) -> Outbound {
        match self {
            BroadcastMessage::Text(text) => Outbound::Message(build_message([text])),
            BroadcastMessage::Unified(message) => Outbound::Message(message),
            BroadcastMessage::Forward(envelope) => Outbound::Forward(envelope),
        }
    }
}

impl From<&str> for BroadcastMessage {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BroadcastMessage {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<UnifiedMessage> for BroadcastMessage {
    fn from(value: UnifiedMessage) -> Self {
        Self::Unified(value)
    }
}

impl From<ForwardEnvelope> for BroadcastMessage {
    fn from(value: ForwardEnvelope) -> Self {
        Self::Forward(value)
    }
}

/// Which sessions a broadcast goes through.
#[derive(Clone, Default)]
pub enum BotSelection {
    /// Every session in the registry.
    #[default]
    AllConnected,
    /// These sessions, whether registered or not.
    Bots(Vec<Arc<dyn Session>>),
    /// Registry lookups by self id; unknown ids are skipped.
    BotIds(Vec<String>),
}

type BlockingGate = dyn Fn(&dyn Session, &str) -> bool + Send + Sync;
type SuspendingGate = dyn Fn(Arc<dyn Session>, String) -> BoxFuture<'static, bool> + Send + Sync;

/// Decides per `(bot, group_id)` whether a destination receives the
/// broadcast. Both forms are treated the same way by the engine.
#[derive(Clone)]
pub enum Gate {
    Blocking(Arc<BlockingGate>),
    Suspending(Arc<SuspendingGate>),
}

impl Gate {
    pub fn blocking<F>(check: F) -> Self
    where
        F: Fn(&dyn Session, &str) -> bool + Send + Sync + 'static,
    {
        Gate::Blocking(Arc::new(check))
    }

    pub fn suspending<F, Fut>(check: F) -> Self
    where
        F: Fn(Arc<dyn Session>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Gate::Suspending(Arc::new(move |bot, group_id| check(bot, group_id).boxed()))
    }
}

/// One broadcast call.
pub struct BroadcastRequest {
    message: BroadcastMessage,
    bots: BotSelection,
    ignore: HashSet<String>,
    platform: Option<String>,
    gate: Option<Gate>,
    label: Option<String>,
}

impl BroadcastRequest {
    pub fn new(message: impl Into<BroadcastMessage>) -> Self {
        Self {
            message: message.into(),
            bots: BotSelection::AllConnected,
            ignore: HashSet::new(),
            platform: None,
            gate: None,
            label: None,
        }
    }

    pub fn bots(mut self, bots: Vec<Arc<dyn Session>>) -> Self {
        self.bots = BotSelection::Bots(bots);
        self
    }

    pub fn bot(self, bot: Arc<dyn Session>) -> Self {
        self.bots(vec![bot])
    }

    pub fn bot_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.bots = BotSelection::BotIds(ids.into_iter().map(canonical_id).collect());
        self
    }

    /// Group or channel ids to leave out. Numbers are stored in their
    /// decimal string form so they compare equal to scene ids.
    pub fn ignore<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.ignore.extend(
            ids.into_iter()
                .map(canonical_id)
                .filter(|id| !id.is_empty()),
        );
        self
    }

    /// Restrict to one platform: "qq", "dodo" or "kaiheila".
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

fn canonical_id(id: impl ToString) -> String {
    id.to_string().trim().to_string()
}

/// Engine-wide defaults merged into every request.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub label: Option<String>,
    pub platform: Option<String>,
    pub ignore: HashSet<String>,
    pub enumeration_timeout: Duration,
    pub gate_timeout: Duration,
    pub dispatch_timeout: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            label: None,
            platform: None,
            ignore: HashSet::new(),
            enumeration_timeout: Duration::from_secs(30),
            gate_timeout: Duration::from_secs(10),
            dispatch_timeout: Duration::from_secs(60),
        }
    }
}

/// Identity of a logical destination within one broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DedupKey {
    pub group_id: String,
    pub channel_id: Option<String>,
}

impl DedupKey {
    /// A channel with a parent is keyed by (parent, channel); anything else
    /// by its own id.
    pub fn from_scene(scene: &Scene) -> Self {
        match scene.parent_id() {
            Some(parent) if scene.is_channel() => Self {
                group_id: parent.to_string(),
                channel_id: Some(scene.id.clone()),
            },
            _ => Self {
                group_id: scene.id.clone(),
                channel_id: None,
            },
        }
    }

    fn is_ignored(&self, ignore: &HashSet<String>) -> bool {
        ignore.contains(&self.group_id)
            || self
                .channel_id
                .as_ref()
                .is_some_and(|channel| ignore.contains(channel))
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.channel_id {
            Some(channel) => write!(f, "{}:{}", self.group_id, channel),
            None => write!(f, "{}:-", self.group_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyDelivered,
    Ignored,
    GateRejected,
    GateTimedOut,
    Unresolvable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered(Receipt),
    Failed(String),
    Skipped(SkipReason),
}

/// What happened to one scene of one bot.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub bot_id: String,
    pub platform: String,
    pub key: DedupKey,
    pub address: Option<Address>,
    pub status: DeliveryStatus,
    pub at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, DeliveryStatus::Failed(_))
    }
}

/// A bot whose scenes could not be listed.
#[derive(Debug, Clone, Serialize)]
pub struct BotFailure {
    pub bot_id: String,
    pub platform: String,
    pub error: String,
}

/// Everything one broadcast attempted.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub invocation_id: Uuid,
    pub label: Option<String>,
    pub outcomes: Vec<DeliveryOutcome>,
    pub bot_failures: Vec<BotFailure>,
    /// Bots left out by the platform filter.
    pub filtered_bots: Vec<String>,
    /// Requested bot ids with no connected session.
    pub unknown_bot_ids: Vec<String>,
}

impl BroadcastReport {
    pub fn delivered(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| o.is_delivered())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn skipped(&self, reason: SkipReason) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.status == DeliveryStatus::Skipped(reason))
    }
}

/// State owned by a single broadcast call.
struct Invocation {
    label: String,
    ignore: HashSet<String>,
    gate: Option<Gate>,
    platform: Option<PlatformFilter>,
    outbound: Outbound,
    /// Destinations already sent to.
    used: HashSet<DedupKey>,
    report: BroadcastReport,
}

/// Sends one message to every distinct, reachable group and channel across
/// the selected sessions, at most once per destination.
///
/// Bots and scenes are visited one at a time. Only request validation fails
/// the call; enumeration, gate, and dispatch problems are logged, recorded in
/// the report, and the engine moves on to the next scene or bot.
pub struct BroadcastEngine {
    registry: SessionRegistry,
    settings: BroadcastSettings,
}

impl BroadcastEngine {
    pub fn new(registry: SessionRegistry, settings: BroadcastSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn broadcast(&self, request: BroadcastRequest) -> Result<BroadcastReport> {
        if request.message.is_empty() {
            return Err(Error::validation("broadcast message must not be empty"));
        }
        fn non_blank(name: &Option<String>) -> Option<&str> {
            name.as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
        }
        let platform = non_blank(&request.platform)
            .or_else(|| non_blank(&self.settings.platform))
            .map(str::parse::<PlatformFilter>)
            .transpose()?;

        let label = request.label.or_else(|| self.settings.label.clone());
        let selection = request.bots;
        let mut ignore = request.ignore;
        ignore.extend(self.settings.ignore.iter().cloned());

        let invocation_id = Uuid::new_v4();
        let mut invocation = Invocation {
            label: label.clone().unwrap_or_default(),
            ignore,
            gate: request.gate,
            platform,
            outbound: request.message.into_outbound(),
            used: HashSet::new(),
            report: BroadcastReport {
                invocation_id,
                label,
                outcomes: Vec::new(),
                bot_failures: Vec::new(),
                filtered_bots: Vec::new(),
                unknown_bot_ids: Vec::new(),
            },
        };

        let span = tracing::info_span!("broadcast", id = %invocation_id, label = %invocation.label);
        async {
            let bots = self.select_bots(selection, &mut invocation).await;
            info!("Broadcasting through {} bot(s)", bots.len());

            for bot in &bots {
                self.broadcast_bot(bot, &mut invocation).await;
            }

            info!(
                "Broadcast finished: {} delivered, {} failed, {} bot(s) unavailable",
                invocation.report.delivered().count(),
                invocation.report.failed().count(),
                invocation.report.bot_failures.len()
            );
        }
        .instrument(span)
        .await;

        Ok(invocation.report)
    }

    /// Explicit bots win over explicit ids, which win over the registry.
    async fn select_bots(
        &self,
        selection: BotSelection,
        invocation: &mut Invocation,
    ) -> Vec<Arc<dyn Session>> {
        match selection {
            BotSelection::Bots(bots) => bots,
            BotSelection::BotIds(ids) => {
                let mut bots = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.registry.get(&id).await {
                        Some(bot) => bots.push(bot),
                        None => {
                            warn!("Bot {} is not connected or does not exist", id);
                            invocation.report.unknown_bot_ids.push(id);
                        }
                    }
                }
                bots
            }
            BotSelection::AllConnected => self.registry.connected().await,
        }
    }

    async fn broadcast_bot(&self, bot: &Arc<dyn Session>, invocation: &mut Invocation) {
        let bot_id = bot.self_id().to_string();
        let platform = resolve_platform(&**bot);

        if let Some(filter) = invocation.platform {
            if !filter.matches(&platform) {
                debug!(
                    "Bot {} on {} does not match platform filter {}, skipping",
                    bot_id,
                    platform,
                    filter.as_str()
                );
                invocation.report.filtered_bots.push(bot_id);
                return;
            }
        }

        let scenes = match self.list_scenes(bot).await {
            Ok(scenes) => scenes,
            Err(e) => {
                error!(bot = %bot_id, platform = %platform, "Failed to list groups: {}", e);
                invocation.report.bot_failures.push(BotFailure {
                    bot_id,
                    platform: platform.to_string(),
                    error: e.to_string(),
                });
                return;
            }
        };

        for scene in scenes.iter().filter(|s| s.is_group() || s.is_channel()) {
            self.broadcast_scene(bot, &platform, scene, invocation).await;
        }
    }

    async fn list_scenes(&self, bot: &Arc<dyn Session>) -> Result<Vec<Scene>> {
        let limit = self.settings.enumeration_timeout;
        match timeout(limit, bot.scenes(&SceneFilter::broadcastable())).await {
            Ok(Ok(scenes)) => Ok(scenes),
            Ok(Err(source)) => Err(Error::SceneEnumeration {
                bot_id: bot.self_id().to_string(),
                source,
            }),
            Err(_) => Err(Error::timeout("scene listing", limit)),
        }
    }

    async fn broadcast_scene(
        &self,
        bot: &Arc<dyn Session>,
        platform: &PlatformIdentity,
        scene: &Scene,
        invocation: &mut Invocation,
    ) {
        let key = DedupKey::from_scene(scene);
        let record = |address: Option<Address>, status: DeliveryStatus| DeliveryOutcome {
            bot_id: bot.self_id().to_string(),
            platform: platform.to_string(),
            key: key.clone(),
            address,
            status,
            at: Utc::now(),
        };

        let skip = if invocation.used.contains(&key) {
            Some(SkipReason::AlreadyDelivered)
        } else if key.is_ignored(&invocation.ignore) {
            Some(SkipReason::Ignored)
        } else {
            None
        };
        if let Some(reason) = skip {
            debug!(destination = %key, "Destination already handled or ignored, skipping");
            invocation
                .report
                .outcomes
                .push(record(None, DeliveryStatus::Skipped(reason)));
            return;
        }

        if let Some(gate) = &invocation.gate {
            let verdict = match gate {
                Gate::Blocking(check) => Some(check(&**bot, &key.group_id)),
                Gate::Suspending(check) => timeout(
                    self.settings.gate_timeout,
                    check(Arc::clone(bot), key.group_id.clone()),
                )
                .await
                .ok(),
            };
            let reason = match verdict {
                Some(true) => None,
                Some(false) => Some(SkipReason::GateRejected),
                None => Some(SkipReason::GateTimedOut),
            };
            if let Some(reason) = reason {
                debug!(destination = %key, "Gate declined destination, skipping");
                invocation
                    .report
                    .outcomes
                    .push(record(None, DeliveryStatus::Skipped(reason)));
                return;
            }
        }

        let address = match resolve_address(None, Some(&key.group_id), key.channel_id.as_deref()) {
            Some(address) => address,
            None => {
                let e = Error::AddressResolution {
                    group_id: Some(key.group_id.clone()),
                    channel_id: key.channel_id.clone(),
                };
                warn!(destination = %key, platform = %platform, "{}", e);
                invocation
                    .report
                    .outcomes
                    .push(record(None, DeliveryStatus::Skipped(SkipReason::Unresolvable)));
                return;
            }
        };

        invocation.used.insert(key.clone());

        let limit = self.settings.dispatch_timeout;
        let sent = match timeout(limit, bot.send(&address, &invocation.outbound)).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(source)) => Err(Error::Dispatch {
                destination: address.to_string(),
                source,
            }),
            Err(_) => Err(Error::timeout(format!("send to {}", address), limit)),
        };

        let status = match sent {
            Ok(receipt) => {
                debug!(destination = %key, bot = %bot.self_id(), "Sent {:?}", receipt.message_ids);
                DeliveryStatus::Delivered(receipt)
            }
            Err(e) => {
                error!(
                    destination = %key,
                    bot = %bot.self_id(),
                    platform = %platform,
                    "Send failed: {}",
                    e
                );
                DeliveryStatus::Failed(e.to_string())
            }
        };
        invocation.report.outcomes.push(record(Some(address), status));
    }
}
