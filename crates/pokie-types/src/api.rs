use serde::{Deserialize, Serialize};

use crate::models::{Session, Story, User, Vote};

// -- JWT Claims --

/// Token claims shared by the REST middleware and the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRequest {
    pub display_name: String,
}

// -- Sessions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub timer_duration: Option<u32>,
}

/// Countdown derived from `Session::timer_end_time` at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerView {
    pub end_time: i64,
    pub remaining_ms: i64,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub stories: Vec<Story>,
    pub members: Vec<User>,
    pub timer: Option<TimerView>,
}

// -- Stories --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self { status: "success".into() }
    }
}

// -- Votes --

/// Card value as sent by clients: either a bare number or a string such as
/// `"5"` or `"?"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteValue {
    Number(i64),
    Text(String),
}

impl VoteValue {
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitVoteRequest {
    #[serde(default)]
    pub value: Option<VoteValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub user_id: String,
    pub has_voted: bool,
}

/// Votes for a story as visible to a member: only who voted until the story
/// completes, then the full records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum VoteListing {
    Hidden { votes: Vec<VoteStatus> },
    Revealed { votes: Vec<Vote>, final_estimate: Option<i64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_value_accepts_numbers_and_strings() {
        let req: SubmitVoteRequest = serde_json::from_str(r#"{"value": 8}"#).unwrap();
        assert_eq!(req.value.unwrap().into_string(), "8");

        let req: SubmitVoteRequest = serde_json::from_str(r#"{"value": "?"}"#).unwrap();
        assert_eq!(req.value.unwrap().into_string(), "?");

        let req: SubmitVoteRequest = serde_json::from_str(r#"{"value": null}"#).unwrap();
        assert!(req.value.is_none());
    }

    #[test]
    fn create_session_timer_is_optional() {
        let req: CreateSessionRequest = serde_json::from_str(r#"{"name": "Sprint 12"}"#).unwrap();
        assert_eq!(req.name, "Sprint 12");
        assert!(req.timer_duration.is_none());
    }
}
