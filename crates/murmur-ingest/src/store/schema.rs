//! SQLite schema for the user and post tables.
//!
//! Both tables are keyed by the feed's external identifier string. The
//! primary-key constraint is what settles concurrent insert races on the
//! same id.
//!
//! Version 1 is the only schema so far, so there are no migrations: a
//! database at version 0 gets the tables created, and anything at the
//! current version is left alone.

use rusqlite::{Connection, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Creates all tables on a fresh database. Safe to call on every start.
pub fn init_schema(conn: &Connection) -> Result<()> {
    if get_schema_version(conn)? == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Stored schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;

    // MAX over an empty table is a single NULL row.
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch("DELETE FROM schema_version")?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Create all tables for a fresh database.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY NOT NULL,
            name TEXT,
            screen_name TEXT NOT NULL DEFAULT '',
            followers_count INTEGER NOT NULL,
            friends_count INTEGER NOT NULL,
            listed_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            favourites_count INTEGER NOT NULL,
            verified INTEGER NOT NULL,
            statuses_count INTEGER NOT NULL,
            default_profile_image INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS posts (
            post_id TEXT PRIMARY KEY NOT NULL,
            text TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            in_reply_to_status_id TEXT,
            in_reply_to_user_id TEXT,
            reposted_post_id TEXT,
            source TEXT NOT NULL DEFAULT '',
            author_id TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
        CREATE INDEX IF NOT EXISTS idx_posts_reposted ON posts(reposted_post_id);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"posts".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // Should not fail

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_init_schema_keeps_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO posts (post_id, created_at, author_id) VALUES ('1', 0, '10')",
            [],
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let posts: i64 = conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(posts, 1);
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_fresh_db_reports_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_primary_key_rejects_duplicate_post() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let insert = "INSERT INTO posts (post_id, created_at, author_id) VALUES ('5', 0, '50')";
        conn.execute(insert, []).unwrap();
        let err = conn.execute(insert, []).unwrap_err();
        assert_eq!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
    }
}
