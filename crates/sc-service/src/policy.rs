//! Resource kinds, roles and capability lookup.
//!
//! Resource types arrive as open string tags, but everything that depends on
//! the kind of resource (capability tables, whether the resource is bound to
//! a live session) matches exhaustively on [`ResourceKind`]. Adding a kind is
//! therefore a compile error until every table handles it.
//!
//! Role resolution itself is not computed here; the resource service decides
//! who is a host, co-host, participant or viewer. This module only maps a
//! resolved role to the capability strings the subscription carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Known kinds of subscribable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Meeting metadata (title, schedule, settings).
    Meetings,
    /// Live transcript stream of an in-progress meeting.
    Transcripts,
    /// Participant list of a meeting.
    Participants,
    /// Collaborative notes attached to a meeting.
    Notes,
    /// Live AI insights generated during a meeting.
    Insights,
}

impl ResourceKind {
    /// Every known kind.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Meetings,
        ResourceKind::Transcripts,
        ResourceKind::Participants,
        ResourceKind::Notes,
        ResourceKind::Insights,
    ];

    /// Parse a resource type tag. Unknown tags return `None`.
    #[must_use]
    pub fn parse(resource_type: &str) -> Option<Self> {
        match resource_type {
            "meetings" => Some(ResourceKind::Meetings),
            "transcripts" => Some(ResourceKind::Transcripts),
            "participants" => Some(ResourceKind::Participants),
            "notes" => Some(ResourceKind::Notes),
            "insights" => Some(ResourceKind::Insights),
            _ => None,
        }
    }

    /// Returns the resource type tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Meetings => "meetings",
            ResourceKind::Transcripts => "transcripts",
            ResourceKind::Participants => "participants",
            ResourceKind::Notes => "notes",
            ResourceKind::Insights => "insights",
        }
    }

    /// Whether the resource only exists while its session is active.
    ///
    /// Subscriptions to these kinds are refused once the session has ended,
    /// carry the session's end as `valid_until`, and are evicted when a
    /// revalidation observes the session as inactive.
    #[must_use]
    pub const fn is_session_bound(&self) -> bool {
        match self {
            ResourceKind::Transcripts | ResourceKind::Insights => true,
            ResourceKind::Meetings | ResourceKind::Participants | ResourceKind::Notes => false,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a user with respect to a resource, as resolved upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    CoHost,
    Participant,
    Viewer,
}

impl Role {
    /// Returns the role as a string for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::CoHost => "co_host",
            Role::Participant => "participant",
            Role::Viewer => "viewer",
        }
    }
}

/// Capabilities granted to `role` on a resource of `kind`.
#[must_use]
pub fn capabilities_for(kind: ResourceKind, role: Role) -> BTreeSet<String> {
    let granted: &[&str] = match kind {
        ResourceKind::Meetings => match role {
            Role::Host => &[
                "meeting:read",
                "meeting:update",
                "meeting:end",
                "meeting:manage_participants",
            ],
            Role::CoHost => &[
                "meeting:read",
                "meeting:update",
                "meeting:manage_participants",
            ],
            Role::Participant | Role::Viewer => &["meeting:read"],
        },
        ResourceKind::Transcripts => match role {
            Role::Host => &["transcript:read", "transcript:export", "transcript:redact"],
            Role::CoHost => &["transcript:read", "transcript:export"],
            Role::Participant => &["transcript:read"],
            Role::Viewer => &[],
        },
        ResourceKind::Participants => match role {
            Role::Host | Role::CoHost => &[
                "participants:read",
                "participants:read_contact",
                "participants:manage",
            ],
            Role::Participant | Role::Viewer => &["participants:read"],
        },
        ResourceKind::Notes => match role {
            Role::Host | Role::CoHost | Role::Participant => &["notes:read", "notes:write"],
            Role::Viewer => &["notes:read"],
        },
        ResourceKind::Insights => match role {
            Role::Host => &["insights:read", "insights:generate"],
            Role::CoHost | Role::Participant => &["insights:read"],
            Role::Viewer => &[],
        },
    };

    granted.iter().map(|c| (*c).to_string()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_known_tags() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_parse_unknown_tag() {
        assert_eq!(ResourceKind::parse("whiteboards"), None);
        assert_eq!(ResourceKind::parse("Meetings"), None);
        assert_eq!(ResourceKind::parse(""), None);
    }

    #[test]
    fn test_session_bound_kinds() {
        assert!(ResourceKind::Transcripts.is_session_bound());
        assert!(ResourceKind::Insights.is_session_bound());
        assert!(!ResourceKind::Meetings.is_session_bound());
        assert!(!ResourceKind::Participants.is_session_bound());
        assert!(!ResourceKind::Notes.is_session_bound());
    }

    #[test]
    fn test_host_has_superset_of_participant_capabilities() {
        for kind in ResourceKind::ALL {
            let host = capabilities_for(kind, Role::Host);
            let participant = capabilities_for(kind, Role::Participant);
            assert!(
                participant.is_subset(&host),
                "host should hold every participant capability on {kind}"
            );
        }
    }

    #[test]
    fn test_viewer_cannot_read_transcripts() {
        assert!(capabilities_for(ResourceKind::Transcripts, Role::Viewer).is_empty());
        assert!(capabilities_for(ResourceKind::Transcripts, Role::Participant)
            .contains("transcript:read"));
    }

    #[test]
    fn test_contact_details_limited_to_hosts() {
        let cohost = capabilities_for(ResourceKind::Participants, Role::CoHost);
        let participant = capabilities_for(ResourceKind::Participants, Role::Participant);

        assert!(cohost.contains("participants:read_contact"));
        assert!(!participant.contains("participants:read_contact"));
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::CoHost).unwrap(), "\"co_host\"");
        let role: Role = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(role, Role::Viewer);
        assert_eq!(Role::CoHost.as_str(), "co_host");
    }
}
