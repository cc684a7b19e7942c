use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use pokie_db::Database;
use pokie_gateway::NotificationHub;
use pokie_types::api::{SessionDetail, VoteListing, VoteStatus};
use pokie_types::events::SessionEvent;
use pokie_types::models::{Session, Story, StoryStatus, User, Vote};

use crate::error::EngineError;
use crate::estimate::median_estimate;
use crate::locks::StoryLocks;
use crate::timer;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_NAME_LEN: usize = 120;
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 4000;
const MAX_VOTE_LEN: usize = 16;

/// Outcome of revealing a story: the completed story and every vote cast.
#[derive(Debug, Clone)]
pub struct Reveal {
    pub story: Story,
    pub votes: Vec<Vote>,
}

/// Owns session, story and vote transitions.
///
/// Every operation authorizes the caller against freshly loaded records,
/// commits its change to the store, and only then broadcasts the resulting
/// event. Cheap to clone.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    db: Arc<Database>,
    hub: NotificationHub,
    locks: StoryLocks,
    store_timeout: Duration,
}

impl SessionEngine {
    pub fn new(db: Arc<Database>, hub: NotificationHub, store_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                db,
                hub,
                locks: StoryLocks::new(),
                store_timeout,
            }),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.inner.hub
    }

    // -- Users --

    /// Look up a user by display name, creating it on first contact.
    pub async fn ensure_user(&self, display_name: &str) -> Result<User, EngineError> {
        let display_name = required_text("display name", display_name, MAX_NAME_LEN)?;
        let candidate = User {
            id: Uuid::new_v4().to_string(),
            display_name,
        };

        let user = self
            .store(move |db| db.get_or_create_user(&candidate, timer::now_ms()))
            .await?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, EngineError> {
        let id = user_id.to_string();
        self.store(move |db| db.get_user(&id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user {}", user_id)))
    }

    pub async fn rename_user(&self, user_id: &str, display_name: &str) -> Result<User, EngineError> {
        let display_name = required_text("display name", display_name, MAX_NAME_LEN)?;

        let id = user_id.to_string();
        let name = display_name.clone();
        let (taken, renamed) = self
            .store(move |db| {
                if let Some(existing) = db.get_user_by_name(&name)? {
                    return Ok((existing.id != id, true));
                }
                Ok((false, db.rename_user(&id, &name)?))
            })
            .await?;

        if taken {
            return Err(EngineError::InvalidInput(format!(
                "display name {} is taken",
                display_name
            )));
        }
        if !renamed {
            return Err(EngineError::NotFound(format!("user {}", user_id)));
        }

        Ok(User {
            id: user_id.to_string(),
            display_name,
        })
    }

    // -- Sessions --

    /// Create a session hosted by `user_id`, who also becomes its first member.
    pub async fn create_session(
        &self,
        user_id: &str,
        name: &str,
        timer_duration: Option<u32>,
    ) -> Result<Session, EngineError> {
        let name = required_text("session name", name, MAX_NAME_LEN)?;
        if timer_duration == Some(0) {
            return Err(EngineError::InvalidInput(
                "timer duration must be at least one second".into(),
            ));
        }

        self.get_user(user_id).await?;

        let session = Session {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: timer::now_ms(),
            host_id: user_id.to_string(),
            current_story_id: None,
            timer_duration,
            timer_end_time: None,
            votes_revealed: false,
        };

        let row = session.clone();
        self.store(move |db| db.create_session(&row)).await?;

        info!("Session {} ({}) created by {}", session.id, session.name, user_id);
        Ok(session)
    }

    /// Join a session. Joining again is a no-op.
    pub async fn join_session(&self, user_id: &str, session_id: &str) -> Result<Session, EngineError> {
        let session = self.load_session(session_id).await?;
        let user = self.get_user(user_id).await?;

        let sid = session.id.clone();
        let uid = user.id.clone();
        let added = self
            .store(move |db| db.add_membership(&sid, &uid, timer::now_ms()))
            .await?;

        if added {
            info!("{} joined session {}", user.display_name, session.id);
            self.inner
                .hub
                .broadcast(
                    &session.id,
                    &SessionEvent::MemberJoined {
                        user_id: user.id,
                        display_name: user.display_name,
                    },
                )
                .await;
        }

        Ok(session)
    }

    /// Full session view for a member, used by clients to resync after
    /// missed events.
    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Result<SessionDetail, EngineError> {
        let session = self.load_session(session_id).await?;
        self.require_member(&session, user_id).await?;

        let sid = session.id.clone();
        let (stories, members) = self
            .store(move |db| {
                let stories = db.list_stories_by_session(&sid)?;
                let members = db.list_members_by_session(&sid)?;
                Ok((stories, members))
            })
            .await?;

        let timer = timer::view(session.timer_end_time, timer::now_ms());
        Ok(SessionDetail {
            session,
            stories,
            members,
            timer,
        })
    }

    /// Sessions the user belongs to, most recently joined first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, EngineError> {
        let uid = user_id.to_string();
        self.store(move |db| {
            let mut sessions = Vec::new();
            for membership in db.list_memberships_by_user(&uid)? {
                match db.get_session(&membership.session_id)? {
                    Some(session) => sessions.push(session),
                    None => warn!("Membership points at missing session {}", membership.session_id),
                }
            }
            Ok(sessions)
        })
        .await
    }

    /// Check that `user_id` may receive this session's events.
    pub async fn authorize_subscriber(&self, user_id: &str, session_id: &str) -> Result<(), EngineError> {
        let session = self.load_session(session_id).await?;
        self.require_member(&session, user_id).await
    }

    // -- Stories --

    pub async fn create_story(
        &self,
        user_id: &str,
        session_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Story, EngineError> {
        let session = self.load_session(session_id).await?;
        require_host(&session, user_id, "create stories")?;

        let title = required_text("story title", title, MAX_TITLE_LEN)?;
        let description = match description.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => {
                return Err(EngineError::InvalidInput(format!(
                    "description is longer than {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
            other => other.map(str::to_string),
        };

        let story = Story {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            title,
            description,
            status: StoryStatus::Pending,
            final_estimate: None,
        };

        let row = story.clone();
        self.store(move |db| db.create_story(&row, timer::now_ms())).await?;

        info!("Story {} ({}) added to session {}", story.id, story.title, session.id);
        self.inner
            .hub
            .broadcast(&session.id, &SessionEvent::StoryCreated { story: story.clone() })
            .await;

        Ok(story)
    }

    /// Open a pending story for votes and make it the session's current story.
    pub async fn start_voting(
        &self,
        user_id: &str,
        session_id: &str,
        story_id: &str,
    ) -> Result<Session, EngineError> {
        let _guard = self.inner.locks.acquire(story_id).await;

        let session = self.load_session(session_id).await?;
        require_host(&session, user_id, "start voting")?;
        let story = self.load_story(&session, story_id).await?;

        if !story.status.can_transition_to(StoryStatus::Voting) {
            return Err(EngineError::InvalidState(format!(
                "story {} is {}, voting only starts on a pending story",
                story.id, story.status
            )));
        }
        if let Some(current) = &session.current_story_id {
            return Err(EngineError::InvalidState(format!(
                "story {} is still being voted on",
                current
            )));
        }

        let timer_end_time = session
            .timer_duration
            .map(|secs| timer::deadline(timer::now_ms(), secs));

        let voting = Story {
            status: StoryStatus::Voting,
            ..story
        };
        let updated = Session {
            current_story_id: Some(voting.id.clone()),
            votes_revealed: false,
            timer_end_time,
            ..session
        };

        self.commit_transition(&voting, StoryStatus::Pending, &updated, None)
            .await?;

        info!("Voting started on story {} in session {}", voting.id, updated.id);
        self.inner
            .hub
            .broadcast(
                &updated.id,
                &SessionEvent::VotingStarted {
                    story_id: voting.id,
                    timer_end_time,
                },
            )
            .await;

        Ok(updated)
    }

    /// Record or overwrite the caller's vote on a story that is open for votes.
    ///
    /// The broadcast says only that the caller voted, never the value.
    pub async fn submit_vote(
        &self,
        user_id: &str,
        session_id: &str,
        story_id: &str,
        value: Option<String>,
    ) -> Result<Vote, EngineError> {
        let _guard = self.inner.locks.acquire(story_id).await;

        let session = self.load_session(session_id).await?;
        let story = self.load_story(&session, story_id).await?;
        self.require_member(&session, user_id).await?;

        let value = match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            Some(v) if v.chars().count() > MAX_VOTE_LEN => {
                return Err(EngineError::InvalidInput(format!(
                    "vote value is longer than {} characters",
                    MAX_VOTE_LEN
                )));
            }
            other => other,
        };

        if story.status != StoryStatus::Voting {
            return Err(not_voting(&story));
        }

        let vote = Vote {
            id: Uuid::new_v4().to_string(),
            story_id: story.id.clone(),
            user_id: user_id.to_string(),
            value,
            timestamp: timer::now_ms(),
        };

        let stored = self
            .store(move |db| db.upsert_vote(&vote))
            .await?
            .ok_or_else(|| not_voting(&story))?;

        info!("{} voted on story {}", user_id, stored.story_id);
        self.inner
            .hub
            .broadcast(
                &session.id,
                &SessionEvent::VoteSubmitted {
                    story_id: stored.story_id.clone(),
                    user_id: stored.user_id.clone(),
                    has_voted: true,
                },
            )
            .await;

        Ok(stored)
    }

    /// Close voting on a story, fix its final estimate and disclose every vote.
    pub async fn reveal_votes(
        &self,
        user_id: &str,
        session_id: &str,
        story_id: &str,
    ) -> Result<Reveal, EngineError> {
        let _guard = self.inner.locks.acquire(story_id).await;

        let session = self.load_session(session_id).await?;
        require_host(&session, user_id, "reveal votes")?;
        let story = self.load_story(&session, story_id).await?;

        if !story.status.can_transition_to(StoryStatus::Completed) {
            return Err(EngineError::InvalidState(format!(
                "story {} is {}, only a story being voted on can be revealed",
                story.id, story.status
            )));
        }

        let sid = story.id.clone();
        let votes = self.store(move |db| db.list_votes_by_story(&sid)).await?;
        let final_estimate = median_estimate(votes.iter().map(|v| v.value.as_deref()));

        let completed = Story {
            status: StoryStatus::Completed,
            final_estimate,
            ..story
        };
        let expected_current = session.current_story_id.clone();
        let updated = Session {
            current_story_id: None,
            timer_end_time: None,
            votes_revealed: true,
            ..session
        };

        self.commit_transition(&completed, StoryStatus::Voting, &updated, expected_current)
            .await?;

        info!(
            "Votes revealed on story {} ({} votes, estimate {:?})",
            completed.id,
            votes.len(),
            final_estimate
        );
        self.inner
            .hub
            .broadcast(
                &updated.id,
                &SessionEvent::VotesRevealed {
                    story_id: completed.id.clone(),
                    votes: votes.clone(),
                    final_estimate,
                },
            )
            .await;

        Ok(Reveal {
            story: completed,
            votes,
        })
    }

    /// Votes on a story as visible to a member: who voted while voting is
    /// open, full values once the story is completed.
    pub async fn list_votes(
        &self,
        user_id: &str,
        session_id: &str,
        story_id: &str,
    ) -> Result<VoteListing, EngineError> {
        let session = self.load_session(session_id).await?;
        self.require_member(&session, user_id).await?;
        let story = self.load_story(&session, story_id).await?;

        let sid = story.id.clone();
        let votes = self.store(move |db| db.list_votes_by_story(&sid)).await?;

        if story.status == StoryStatus::Completed {
            return Ok(VoteListing::Revealed {
                votes,
                final_estimate: story.final_estimate,
            });
        }

        Ok(VoteListing::Hidden {
            votes: votes
                .into_iter()
                .map(|v| VoteStatus {
                    user_id: v.user_id,
                    has_voted: true,
                })
                .collect(),
        })
    }

    // -- Helpers --

    async fn load_session(&self, session_id: &str) -> Result<Session, EngineError> {
        let id = session_id.to_string();
        self.store(move |db| db.get_session(&id))
            .await?
            .ok_or_else(|| EngineError::session_not_found(session_id))
    }

    /// A story that exists but belongs to another session counts as missing.
    async fn load_story(&self, session: &Session, story_id: &str) -> Result<Story, EngineError> {
        let id = story_id.to_string();
        self.store(move |db| db.get_story(&id))
            .await?
            .filter(|story| story.session_id == session.id)
            .ok_or_else(|| EngineError::story_not_found(story_id))
    }

    async fn require_member(&self, session: &Session, user_id: &str) -> Result<(), EngineError> {
        if session.is_host(user_id) {
            return Ok(());
        }

        let sid = session.id.clone();
        let uid = user_id.to_string();
        if self.store(move |db| db.is_member(&sid, &uid)).await? {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "not a member of session {}",
                session.id
            )))
        }
    }

    async fn commit_transition(
        &self,
        story: &Story,
        expected_status: StoryStatus,
        session: &Session,
        expected_current: Option<String>,
    ) -> Result<(), EngineError> {
        let story_row = story.clone();
        let session_row = session.clone();
        let committed = self
            .store(move |db| {
                db.commit_story_transition(
                    &story_row,
                    expected_status,
                    &session_row,
                    expected_current.as_deref(),
                )
            })
            .await?;

        if committed {
            Ok(())
        } else {
            warn!("Lost a concurrent update on story {} in session {}", story.id, session.id);
            Err(EngineError::InvalidState(format!(
                "story {} or session {} changed concurrently",
                story.id, session.id
            )))
        }
    }

    /// Run a store call off the async runtime, bounded by the store timeout.
    async fn store<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.inner.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&*db));

        match tokio::time::timeout(self.inner.store_timeout, task).await {
            Ok(Ok(result)) => result.map_err(EngineError::Store),
            Ok(Err(e)) => {
                error!("spawn_blocking join error: {}", e);
                Err(EngineError::Store(anyhow::anyhow!("store task failed: {}", e)))
            }
            Err(_) => {
                warn!("State store call exceeded {:?}", self.inner.store_timeout);
                Err(EngineError::StoreTimeout)
            }
        }
    }
}

fn require_host(session: &Session, user_id: &str, action: &str) -> Result<(), EngineError> {
    if session.is_host(user_id) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("only the host can {}", action)))
    }
}

fn not_voting(story: &Story) -> EngineError {
    EngineError::InvalidState(format!("story {} is not open for votes", story.id))
}

/// Trim and length-check a required piece of text.
fn required_text(field: &str, value: &str, max_len: usize) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(EngineError::InvalidInput(format!(
            "{} is longer than {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}
