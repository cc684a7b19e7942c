use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                display_name    TEXT NOT NULL UNIQUE,
                created_at      INTEGER NOT NULL
            );

            -- current_story_id is not a foreign key: sessions and stories
            -- reference each other.
            CREATE TABLE sessions (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                created_at          INTEGER NOT NULL,
                host_id             TEXT NOT NULL REFERENCES users(id),
                current_story_id    TEXT,
                timer_duration      INTEGER,
                timer_end_time      INTEGER,
                votes_revealed      INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE stories (
                id              TEXT PRIMARY KEY,
                session_id      TEXT NOT NULL REFERENCES sessions(id),
                title           TEXT NOT NULL,
                description     TEXT,
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'voting', 'completed')),
                final_estimate  INTEGER,
                created_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_stories_session
                ON stories(session_id, created_at);

            CREATE TABLE votes (
                id          TEXT PRIMARY KEY,
                story_id    TEXT NOT NULL REFERENCES stories(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                value       TEXT,
                timestamp   INTEGER NOT NULL,
                UNIQUE(story_id, user_id)
            );

            CREATE TABLE session_members (
                session_id  TEXT NOT NULL REFERENCES sessions(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                joined_at   INTEGER NOT NULL,
                PRIMARY KEY (session_id, user_id)
            );

            CREATE INDEX idx_session_members_user
                ON session_members(user_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
