use serde::{Deserialize, Serialize};

use crate::models::{Story, Vote};

/// Events pushed to every connection registered for a session.
///
/// Serialized as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent once to a freshly opened connection, never broadcast
    Ready { session_id: String, user_id: String },

    /// The host added a story to the session
    StoryCreated { story: Story },

    /// A story is open for votes
    VotingStarted {
        story_id: String,
        timer_end_time: Option<i64>,
    },

    /// Someone voted. Carries no value: votes stay blind until reveal.
    VoteSubmitted {
        story_id: String,
        user_id: String,
        has_voted: bool,
    },

    /// The host revealed the votes for a story
    VotesRevealed {
        story_id: String,
        votes: Vec<Vote>,
        final_estimate: Option<i64>,
    },

    /// A user joined the session for the first time
    MemberJoined { user_id: String, display_name: String },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::StoryCreated { .. } => "story_created",
            Self::VotingStarted { .. } => "voting_started",
            Self::VoteSubmitted { .. } => "vote_submitted",
            Self::VotesRevealed { .. } => "votes_revealed",
            Self::MemberJoined { .. } => "member_joined",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_submitted_wire_shape() {
        let event = SessionEvent::VoteSubmitted {
            story_id: "s1".into(),
            user_id: "u1".into(),
            has_voted: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "vote_submitted",
                "data": { "story_id": "s1", "user_id": "u1", "has_voted": true }
            })
        );
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let event = SessionEvent::VotesRevealed {
            story_id: "s1".into(),
            votes: vec![],
            final_estimate: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert!(json["data"]["final_estimate"].is_null());
    }
}
