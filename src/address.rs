use serde::{Deserialize, Serialize};

/// A resolved destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Address {
    Private {
        user_id: String,
    },
    Group {
        group_id: String,
    },
    Channel {
        channel_id: String,
        parent_group_id: String,
    },
}

impl Address {
    /// The id the transport actually sends to.
    pub fn target_id(&self) -> &str {
        match self {
            Address::Private { user_id } => user_id,
            Address::Group { group_id } => group_id,
            Address::Channel { channel_id, .. } => channel_id,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Address::Private { .. })
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Private { user_id } => write!(f, "private:{}", user_id),
            Address::Group { group_id } => write!(f, "group:{}", group_id),
            Address::Channel {
                channel_id,
                parent_group_id,
            } => write!(f, "channel:{}/{}", parent_group_id, channel_id),
        }
    }
}

/// Resolve a destination from optional ids. First match wins:
/// group + channel, then group, then user. Empty ids count as absent.
///
/// Channel addressing always needs both ids, so the same rules hold on every
/// platform.
pub fn resolve_address(
    user_id: Option<&str>,
    group_id: Option<&str>,
    channel_id: Option<&str>,
) -> Option<Address> {
    let present = |id: Option<&str>| id.filter(|s| !s.is_empty()).map(str::to_string);

    match (present(user_id), present(group_id), present(channel_id)) {
        (_, Some(group_id), Some(channel_id)) => Some(Address::Channel {
            channel_id,
            parent_group_id: group_id,
        }),
        (_, Some(group_id), None) => Some(Address::Group { group_id }),
        (Some(user_id), None, _) => Some(Address::Private { user_id }),
        (None, None, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_and_channel_resolve_to_channel() {
        assert_eq!(
            resolve_address(None, Some("G"), Some("C")),
            Some(Address::Channel {
                channel_id: "C".into(),
                parent_group_id: "G".into()
            })
        );
    }

    #[test]
    fn test_group_only() {
        assert_eq!(
            resolve_address(None, Some("G"), None),
            Some(Address::Group {
                group_id: "G".into()
            })
        );
    }

    #[test]
    fn test_user_only() {
        assert_eq!(
            resolve_address(Some("U"), None, None),
            Some(Address::Private {
                user_id: "U".into()
            })
        );
    }

    #[test]
    fn test_nothing_resolves_to_none() {
        assert_eq!(resolve_address(None, None, None), None);
        assert_eq!(resolve_address(Some(""), Some(""), None), None);
    }

    #[test]
    fn test_group_wins_over_user() {
        let address = resolve_address(Some("U"), Some("G"), None).unwrap();
        assert_eq!(address.target_id(), "G");
    }

    #[test]
    fn test_channel_without_group_falls_back_to_user() {
        assert_eq!(
            resolve_address(Some("U"), None, Some("C")),
            Some(Address::Private {
                user_id: "U".into()
            })
        );
    }

    #[test]
    fn test_display() {
        let address = resolve_address(None, Some("G"), Some("C")).unwrap();
        assert_eq!(address.to_string(), "channel:G/C");
    }
}
