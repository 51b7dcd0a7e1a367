use std::path::PathBuf;
use std::time::Duration;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed broadcast errors.
///
/// Only [`Error::Validation`] is ever returned from
/// [`BroadcastEngine::broadcast`](crate::broadcast::BroadcastEngine::broadcast);
/// every other variant is captured at the step that produced it and shows up
/// in logs and in the [`BroadcastReport`](crate::broadcast::BroadcastReport).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pre-flight check failed (empty message, unsupported platform filter).
    #[error("invalid broadcast request: {message}")]
    Validation { message: String },

    /// No address could be derived from the scene ids.
    #[error("no address for group {group_id:?} channel {channel_id:?}")]
    AddressResolution {
        group_id: Option<String>,
        channel_id: Option<String>,
    },

    /// A session could not list its scenes.
    #[error("failed to list scenes for bot {bot_id}: {source:#}")]
    SceneEnumeration {
        bot_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Sending to one destination failed.
    #[error("failed to send to {destination}: {source:#}")]
    Dispatch {
        destination: String,
        #[source]
        source: anyhow::Error,
    },

    /// A content item pointed at a file that does not exist.
    #[error("image path does not exist: {}", path.display())]
    MissingContentSource { path: PathBuf },

    /// An external call did not finish before its deadline.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    /// An in-memory picture could not be encoded.
    #[error(transparent)]
    ImageEncode(#[from] image::ImageError),

    /// Configuration could not be parsed.
    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn validation(message: impl std::fmt::Display) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
