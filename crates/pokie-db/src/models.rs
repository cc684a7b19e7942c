//! Row mapping between SQLite rows and the shared pokie-types records.
//! Column order in each `*_COLUMNS` constant matches the index reads below.

use rusqlite::Row;
use rusqlite::types::Type;

use pokie_types::models::{Membership, Session, Story, StoryStatus, User, Vote};

pub const USER_COLUMNS: &str = "id, display_name";

pub const SESSION_COLUMNS: &str =
    "id, name, created_at, host_id, current_story_id, timer_duration, timer_end_time, votes_revealed";

pub const STORY_COLUMNS: &str = "id, session_id, title, description, status, final_estimate";

pub const VOTE_COLUMNS: &str = "id, story_id, user_id, value, timestamp";

pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        display_name: row.get(1)?,
    })
}

pub fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        host_id: row.get(3)?,
        current_story_id: row.get(4)?,
        timer_duration: row.get(5)?,
        timer_end_time: row.get(6)?,
        votes_revealed: row.get(7)?,
    })
}

pub fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    let status: String = row.get(4)?;
    let status = status
        .parse::<StoryStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;

    Ok(Story {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status,
        final_estimate: row.get(5)?,
    })
}

pub fn vote_from_row(row: &Row<'_>) -> rusqlite::Result<Vote> {
    Ok(Vote {
        id: row.get(0)?,
        story_id: row.get(1)?,
        user_id: row.get(2)?,
        value: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

pub fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        joined_at: row.get(2)?,
    })
}
