//! Outbound messaging for multi-platform chat bots.
//!
//! Content of any shape is normalized into a [`UnifiedMessage`], destinations
//! are resolved into an [`Address`], and [`BroadcastEngine`] fans one message
//! out to every distinct group and channel reachable by the connected
//! [`Session`]s, at most once per destination.

pub mod address;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod message;
pub mod module_format;
pub mod platform;
pub mod session;

#[cfg(test)]
mod test_support;

pub use address::{resolve_address, Address};
pub use broadcast::{
    BotSelection, BroadcastEngine, BroadcastMessage, BroadcastReport, BroadcastRequest,
    BroadcastSettings, DedupKey, DeliveryOutcome, DeliveryStatus, Gate, SkipReason,
};
pub use config::Config;
pub use error::{Error, Result};
pub use message::forward::{build_forward_batch, ForwardEnvelope, ForwardNode};
pub use message::{build_message, ContentItem, MediaRef, MessageSegment, UnifiedMessage};
pub use platform::{resolve_platform, PlatformIdentity};
pub use session::{Outbound, Receipt, Scene, SceneFilter, SceneKind, Session, SessionRegistry};
