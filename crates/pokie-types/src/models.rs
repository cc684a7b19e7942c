use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Vote value meaning "I can't estimate this". Never counted in the median.
pub const UNSURE: &str = "?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
}

/// A planning session. `created_at` and `timer_end_time` are ms since epoch,
/// `timer_duration` is in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub host_id: String,
    pub current_story_id: Option<String>,
    pub timer_duration: Option<u32>,
    pub timer_end_time: Option<i64>,
    pub votes_revealed: bool,
}

impl Session {
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }
}

/// Story lifecycle. Transitions only move forward:
///
/// ```text
/// Pending → Voting → Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Pending,
    Voting,
    Completed,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Voting => "voting",
            Self::Completed => "completed",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Voting),
            Self::Voting => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "voting" => Ok(Self::Voting),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown story status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: StoryStatus,
    pub final_estimate: Option<i64>,
}

/// One user's vote on one story. At most one per (story_id, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub story_id: String,
    pub user_id: String,
    pub value: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub session_id: String,
    pub user_id: String,
    pub joined_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn story_status_moves_forward_only() {
        assert!(StoryStatus::Pending.can_transition_to(StoryStatus::Voting));
        assert!(StoryStatus::Voting.can_transition_to(StoryStatus::Completed));
        assert!(!StoryStatus::Pending.can_transition_to(StoryStatus::Completed));
        assert!(!StoryStatus::Completed.can_transition_to(StoryStatus::Pending));
        assert!(!StoryStatus::Voting.can_transition_to(StoryStatus::Pending));
        assert_eq!(StoryStatus::Completed.next(), None);
    }

    #[test]
    fn story_status_parses_its_own_output() {
        for status in [StoryStatus::Pending, StoryStatus::Voting, StoryStatus::Completed] {
            assert_eq!(status.as_str().parse::<StoryStatus>().unwrap(), status);
        }
        assert!("archived".parse::<StoryStatus>().is_err());
    }

    #[test]
    fn story_status_serializes_lowercase() {
        let json = serde_json::to_string(&StoryStatus::Voting).unwrap();
        assert_eq!(json, "\"voting\"");
    }
}
