use crate::Database;
use crate::models::{
    SESSION_COLUMNS, STORY_COLUMNS, USER_COLUMNS, VOTE_COLUMNS, membership_from_row,
    session_from_row, story_from_row, user_from_row, vote_from_row,
};
use anyhow::Result;
use rusqlite::{Connection, params};

use pokie_types::models::{Membership, Session, Story, StoryStatus, User, Vote};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &User, created_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)",
                params![user.id, user.display_name, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    pub fn get_user_by_name(&self, display_name: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE display_name = ?1", USER_COLUMNS);
            conn.query_row(&sql, [display_name], user_from_row).optional()
        })
    }

    /// Returns the user named `candidate.display_name`, inserting `candidate`
    /// if there is none yet.
    pub fn get_or_create_user(&self, candidate: &User, created_at: i64) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)",
                params![candidate.id, candidate.display_name, created_at],
            )?;
            let sql = format!("SELECT {} FROM users WHERE display_name = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [&candidate.display_name], user_from_row)?)
        })
    }

    /// Returns false if no such user exists.
    pub fn rename_user(&self, id: &str, display_name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET display_name = ?2 WHERE id = ?1",
                params![id, display_name],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Sessions --

    /// Inserts the session and the host's membership in one transaction.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO sessions (id, name, created_at, host_id, current_story_id,
                                       timer_duration, timer_end_time, votes_revealed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id,
                    session.name,
                    session.created_at,
                    session.host_id,
                    session.current_story_id,
                    session.timer_duration,
                    session.timer_end_time,
                    session.votes_revealed,
                ],
            )?;
            insert_membership(&tx, &session.id, &session.host_id, session.created_at)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.with_conn(|conn| query_session(conn, id))
    }

    // -- Stories --

    pub fn create_story(&self, story: &Story, created_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (id, session_id, title, description, status, final_estimate, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    story.id,
                    story.session_id,
                    story.title,
                    story.description,
                    story.status.as_str(),
                    story.final_estimate,
                    created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_story(&self, id: &str) -> Result<Option<Story>> {
        self.with_conn(|conn| query_story(conn, id))
    }

    pub fn list_stories_by_session(&self, session_id: &str) -> Result<Vec<Story>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM stories WHERE session_id = ?1 ORDER BY created_at, rowid",
                STORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([session_id], story_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Persists a story status change together with the session fields that
    /// move with it, in one transaction.
    ///
    /// Optimistic on both rows: the story must still be in `expected_status`
    /// and the session's `current_story_id` must still equal
    /// `expected_current`. Returns false (and writes nothing) otherwise.
    pub fn commit_story_transition(
        &self,
        story: &Story,
        expected_status: StoryStatus,
        session: &Session,
        expected_current: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !update_story(&tx, story, expected_status)? {
                return Ok(false);
            }
            if !update_session(&tx, session, expected_current)? {
                // Dropping the transaction rolls the story update back
                return Ok(false);
            }

            tx.commit()?;
            Ok(true)
        })
    }

    // -- Votes --

    /// Insert or overwrite the caller's vote, only while the story is voting.
    ///
    /// An existing vote is replaced only by a submission with an equal or
    /// newer timestamp. Returns the stored vote, or `None` if the story is
    /// not (or no longer) accepting votes.
    pub fn upsert_vote(&self, vote: &Vote) -> Result<Option<Vote>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let status: Option<String> = tx
                .query_row("SELECT status FROM stories WHERE id = ?1", [&vote.story_id], |r| {
                    r.get(0)
                })
                .optional()?;
            if status.as_deref() != Some(StoryStatus::Voting.as_str()) {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO votes (id, story_id, user_id, value, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (story_id, user_id) DO UPDATE
                    SET value = excluded.value, timestamp = excluded.timestamp
                    WHERE excluded.timestamp >= votes.timestamp",
                params![vote.id, vote.story_id, vote.user_id, vote.value, vote.timestamp],
            )?;

            let sql = format!(
                "SELECT {} FROM votes WHERE story_id = ?1 AND user_id = ?2",
                VOTE_COLUMNS
            );
            let stored = tx.query_row(&sql, params![vote.story_id, vote.user_id], vote_from_row)?;

            tx.commit()?;
            Ok(Some(stored))
        })
    }

    pub fn list_votes_by_story(&self, story_id: &str) -> Result<Vec<Vote>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM votes WHERE story_id = ?1 ORDER BY timestamp, id",
                VOTE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([story_id], vote_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Memberships --

    /// Idempotent. Returns true only when the membership is new.
    pub fn add_membership(&self, session_id: &str, user_id: &str, joined_at: i64) -> Result<bool> {
        self.with_conn(|conn| insert_membership(conn, session_id, user_id, joined_at))
    }

    pub fn is_member(&self, session_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM session_members WHERE session_id = ?1 AND user_id = ?2",
                    [session_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn list_memberships_by_user(&self, user_id: &str) -> Result<Vec<Membership>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, user_id, joined_at FROM session_members
                 WHERE user_id = ?1
                 ORDER BY joined_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], membership_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_members_by_session(&self, session_id: &str) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.display_name
                 FROM session_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.session_id = ?1
                 ORDER BY m.joined_at, u.display_name",
            )?;
            let rows = stmt
                .query_map([session_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_session(conn: &Connection, id: &str) -> Result<Option<Session>> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS);
    conn.query_row(&sql, [id], session_from_row).optional()
}

fn query_story(conn: &Connection, id: &str) -> Result<Option<Story>> {
    let sql = format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS);
    conn.query_row(&sql, [id], story_from_row).optional()
}

fn insert_membership(conn: &Connection, session_id: &str, user_id: &str, joined_at: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO session_members (session_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![session_id, user_id, joined_at],
    )?;
    Ok(inserted == 1)
}

fn update_story(conn: &Connection, story: &Story, expected_status: StoryStatus) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE stories
            SET title = ?2, description = ?3, status = ?4, final_estimate = ?5
          WHERE id = ?1 AND status = ?6",
        params![
            story.id,
            story.title,
            story.description,
            story.status.as_str(),
            story.final_estimate,
            expected_status.as_str(),
        ],
    )?;
    Ok(changed == 1)
}

fn update_session(conn: &Connection, session: &Session, expected_current: Option<&str>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE sessions
            SET name = ?2, current_story_id = ?3, timer_duration = ?4,
                timer_end_time = ?5, votes_revealed = ?6
          WHERE id = ?1 AND current_story_id IS ?7",
        params![
            session.id,
            session.name,
            session.current_story_id,
            session.timer_duration,
            session.timer_end_time,
            session.votes_revealed,
            expected_current,
        ],
    )?;
    Ok(changed == 1)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> (Database, Session, Story) {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in [("host", "Hana"), ("u2", "Ilya")] {
            db.create_user(&User { id: id.into(), display_name: name.into() }, 1).unwrap();
        }

        let session = Session {
            id: "s1".into(),
            name: "Sprint 12".into(),
            created_at: 1_000,
            host_id: "host".into(),
            current_story_id: None,
            timer_duration: None,
            timer_end_time: None,
            votes_revealed: false,
        };
        db.create_session(&session).unwrap();

        let story = Story {
            id: "t1".into(),
            session_id: "s1".into(),
            title: "Login page".into(),
            description: None,
            status: StoryStatus::Pending,
            final_estimate: None,
        };
        db.create_story(&story, 1_001).unwrap();
        (db, session, story)
    }

    fn start(db: &Database, session: &Session, story: &Story) -> bool {
        let story = Story { status: StoryStatus::Voting, ..story.clone() };
        let session = Session { current_story_id: Some(story.id.clone()), ..session.clone() };
        db.commit_story_transition(&story, StoryStatus::Pending, &session, None).unwrap()
    }

    fn vote(user_id: &str, value: &str, timestamp: i64) -> Vote {
        Vote {
            id: format!("v-{}-{}", user_id, timestamp),
            story_id: "t1".into(),
            user_id: user_id.into(),
            value: Some(value.into()),
            timestamp,
        }
    }

    #[test]
    fn create_session_adds_host_membership() {
        let (db, _, _) = seed();
        assert!(db.is_member("s1", "host").unwrap());
        assert!(!db.is_member("s1", "u2").unwrap());

        assert!(db.add_membership("s1", "u2", 2_000).unwrap());
        assert!(!db.add_membership("s1", "u2", 3_000).unwrap());

        let members = db.list_members_by_session("s1").unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(db.list_memberships_by_user("u2").unwrap()[0].joined_at, 2_000);
    }

    #[test]
    fn get_or_create_user_reuses_existing_name() {
        let (db, _, _) = seed();
        let fresh = User { id: "new-id".into(), display_name: "Hana".into() };
        let user = db.get_or_create_user(&fresh, 5).unwrap();
        assert_eq!(user.id, "host");

        let fresh = User { id: "u3".into(), display_name: "Juno".into() };
        assert_eq!(db.get_or_create_user(&fresh, 5).unwrap(), fresh);
        assert_eq!(db.get_user("u3").unwrap().unwrap().display_name, "Juno");
    }

    #[test]
    fn vote_rejected_unless_story_is_voting() {
        let (db, session, story) = seed();
        assert_eq!(db.upsert_vote(&vote("u2", "5", 10)).unwrap(), None);

        assert!(start(&db, &session, &story));
        assert!(db.upsert_vote(&vote("u2", "5", 10)).unwrap().is_some());
    }

    #[test]
    fn upsert_keeps_one_row_and_newest_value() {
        let (db, session, story) = seed();
        assert!(start(&db, &session, &story));

        let first = db.upsert_vote(&vote("u2", "5", 10)).unwrap().unwrap();
        let second = db.upsert_vote(&vote("u2", "8", 20)).unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.value.as_deref(), Some("8"));

        // An older submission landing late does not win
        let stale = db.upsert_vote(&vote("u2", "3", 15)).unwrap().unwrap();
        assert_eq!(stale.value.as_deref(), Some("8"));
        assert_eq!(stale.timestamp, 20);

        assert_eq!(db.list_votes_by_story("t1").unwrap().len(), 1);
    }

    #[test]
    fn transition_is_optimistic_on_status() {
        let (db, session, story) = seed();
        assert!(start(&db, &session, &story));
        // Second start from a stale pending view writes nothing
        assert!(!start(&db, &session, &story));

        let stored = db.get_session("s1").unwrap().unwrap();
        assert_eq!(stored.current_story_id.as_deref(), Some("t1"));
    }

    #[test]
    fn transition_rolls_back_story_when_session_moved() {
        let (db, mut session, story) = seed();
        session.current_story_id = Some("elsewhere".into());
        let voting = Story { status: StoryStatus::Voting, ..story.clone() };

        // Session row expects current_story_id = "elsewhere", which is stale
        let ok = db
            .commit_story_transition(&voting, StoryStatus::Pending, &session, Some("elsewhere"))
            .unwrap();
        assert!(!ok);
        assert_eq!(db.get_story("t1").unwrap().unwrap().status, StoryStatus::Pending);
    }
}
