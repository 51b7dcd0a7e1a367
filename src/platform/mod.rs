pub mod telegram;

use std::str::FromStr;

use crate::error::Error;
use crate::session::Session;

/// Which chat platform a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlatformIdentity {
    Qq,
    Kaiheila,
    Kook,
    Dodo,
    /// Any other platform, holding the lower-cased scope.
    Other(String),
    Unknown,
}

impl PlatformIdentity {
    /// Classify a raw scope string. Every scope starting with "qq" (QQ
    /// official API, QQClient, ...) collapses to `Qq`.
    pub fn from_scope(scope: Option<&str>) -> Self {
        let scope = match scope.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_lowercase(),
            None => return PlatformIdentity::Unknown,
        };
        if scope.starts_with("qq") {
            return PlatformIdentity::Qq;
        }
        match scope.as_str() {
            "kaiheila" => PlatformIdentity::Kaiheila,
            "kook" => PlatformIdentity::Kook,
            "dodo" => PlatformIdentity::Dodo,
            _ => PlatformIdentity::Other(scope),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlatformIdentity::Qq => "qq",
            PlatformIdentity::Kaiheila => "kaiheila",
            PlatformIdentity::Kook => "kook",
            PlatformIdentity::Dodo => "dodo",
            PlatformIdentity::Other(scope) => scope,
            PlatformIdentity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PlatformIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the platform of a connected session.
pub fn resolve_platform(session: &dyn Session) -> PlatformIdentity {
    PlatformIdentity::from_scope(session.scope().as_deref())
}

/// Platforms a broadcast may be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFilter {
    Qq,
    Dodo,
    Kaiheila,
}

impl PlatformFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFilter::Qq => "qq",
            PlatformFilter::Dodo => "dodo",
            PlatformFilter::Kaiheila => "kaiheila",
        }
    }

    /// Compares by platform name, so a "kook" session does not match
    /// `Kaiheila`.
    pub fn matches(&self, platform: &PlatformIdentity) -> bool {
        self.as_str() == platform.as_str()
    }
}

impl FromStr for PlatformFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qq" => Ok(PlatformFilter::Qq),
            "dodo" => Ok(PlatformFilter::Dodo),
            "kaiheila" => Ok(PlatformFilter::Kaiheila),
            other => Err(Error::validation(format!(
                "unsupported platform filter '{}' (expected qq, dodo or kaiheila)",
                other
            ))),
        }
    }
}
