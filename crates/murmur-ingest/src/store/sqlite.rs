//! SQLite-backed [`PersistenceStore`].
//!
//! Uses a single connection behind a mutex. Queries run on tokio's blocking
//! pool so the feed and the executor never wait on disk I/O.

use super::schema::init_schema;
use super::{EntityKind, PersistenceStore, StoreError, StoreResult};
use murmur_core::{Post, User};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// SQLite-backed user and post storage.
///
/// Create with [`SqliteStore::open`] for file-backed persistence or
/// [`SqliteStore::open_in_memory`] for tests.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at `path`, creating parent directories and
    /// the schema as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("Opening store at {}", path.display());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored users.
    pub fn count_users(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of stored posts.
    pub fn count_posts(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl PersistenceStore for SqliteStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let id = id.to_string();
        self.run(move |conn| select_user(conn, &id)).await
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        let user = user.clone();
        self.run(move |conn| insert_user(conn, &user)).await
    }

    async fn get_post(&self, id: &str) -> StoreResult<Option<Post>> {
        let id = id.to_string();
        self.run(move |conn| select_post(conn, &id)).await
    }

    async fn put_post(&self, post: &Post) -> StoreResult<()> {
        let post = post.clone();
        self.run(move |conn| insert_post(conn, &post)).await
    }
}

fn select_user(conn: &Connection, id: &str) -> StoreResult<Option<User>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, name, screen_name, followers_count, friends_count, listed_count,
                created_at, favourites_count, verified, statuses_count, default_profile_image
         FROM users WHERE user_id = ?1",
    )?;

    let user = stmt
        .query_row([id], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                screen_name: row.get(2)?,
                followers_count: row.get(3)?,
                friends_count: row.get(4)?,
                listed_count: row.get(5)?,
                created_at: row.get(6)?,
                favourites_count: row.get(7)?,
                verified: row.get(8)?,
                statuses_count: row.get(9)?,
                default_profile_image: row.get(10)?,
            })
        })
        .optional()?;

    Ok(user)
}

fn insert_user(conn: &Connection, user: &User) -> StoreResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO users (user_id, name, screen_name, followers_count, friends_count,
                            listed_count, created_at, favourites_count, verified,
                            statuses_count, default_profile_image)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    stmt.execute(params![
        user.id,
        user.name,
        user.screen_name,
        user.followers_count,
        user.friends_count,
        user.listed_count,
        user.created_at,
        user.favourites_count,
        user.verified,
        user.statuses_count,
        user.default_profile_image,
    ])
    .map_err(|e| insert_error(e, EntityKind::User, &user.id))?;

    Ok(())
}

fn select_post(conn: &Connection, id: &str) -> StoreResult<Option<Post>> {
    let mut stmt = conn.prepare_cached(
        "SELECT post_id, text, created_at, in_reply_to_status_id, in_reply_to_user_id,
                reposted_post_id, source, author_id
         FROM posts WHERE post_id = ?1",
    )?;

    let post = stmt
        .query_row([id], |row| {
            Ok(Post {
                id: row.get(0)?,
                text: row.get(1)?,
                created_at: row.get(2)?,
                in_reply_to_status_id: row.get(3)?,
                in_reply_to_user_id: row.get(4)?,
                reposted_post_id: row.get(5)?,
                source: row.get(6)?,
                author_id: row.get(7)?,
            })
        })
        .optional()?;

    Ok(post)
}

fn insert_post(conn: &Connection, post: &Post) -> StoreResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO posts (post_id, text, created_at, in_reply_to_status_id,
                            in_reply_to_user_id, reposted_post_id, source, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    stmt.execute(params![
        post.id,
        post.text,
        post.created_at,
        post.in_reply_to_status_id,
        post.in_reply_to_user_id,
        post.reposted_post_id,
        post.source,
        post.author_id,
    ])
    .map_err(|e| insert_error(e, EntityKind::Post, &post.id))?;

    Ok(())
}

/// Map a primary-key violation to [`StoreError::DuplicateKey`].
fn insert_error(err: rusqlite::Error, kind: EntityKind, id: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::DuplicateKey {
                kind,
                id: id.to_string(),
            }
        }
        other => StoreError::Sqlite(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: Some(format!("user {}", id)),
            screen_name: format!("u{}", id),
            followers_count: 10,
            friends_count: 20,
            listed_count: 1,
            created_at: 1_142_974_214,
            favourites_count: 5,
            verified: false,
            statuses_count: 100,
            default_profile_image: true,
        }
    }

    fn post(id: &str, author_id: &str) -> Post {
        Post {
            id: id.to_string(),
            text: format!("post {}", id),
            created_at: 1_539_202_764,
            in_reply_to_status_id: None,
            in_reply_to_user_id: None,
            reposted_post_id: None,
            source: "web".to_string(),
            author_id: author_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_user_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_user("10").await.unwrap().is_none());

        let u = user("10");
        store.put_user(&u).await.unwrap();

        assert_eq!(store.get_user("10").await.unwrap(), Some(u));
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_post_roundtrip_with_optional_fields() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut p = post("1", "10");
        p.reposted_post_id = Some("2".to_string());
        p.in_reply_to_user_id = Some("20".to_string());
        store.put_post(&p).await.unwrap();

        let loaded = store.get_post("1").await.unwrap().unwrap();
        assert_eq!(loaded, p);
        assert!(store.get_post("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_lookup_does_not_match_user_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_user(&user("7")).await.unwrap();

        assert!(store.get_post("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected_without_overwrite() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_post(&post("5", "50")).await.unwrap();

        let mut second = post("5", "50");
        second.text = "edited".to_string();
        let err = store.put_post(&second).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateKey { kind: EntityKind::Post, ref id } if id == "5"
        ));

        let stored = store.get_post("5").await.unwrap().unwrap();
        assert_eq!(stored.text, "post 5");
        assert_eq!(store.count_posts().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_user_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_user(&user("10")).await.unwrap();

        let err = store.put_user(&user("10")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { kind: EntityKind::User, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_have_one_winner() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.put_post(&post("9", "90")).await })
            })
            .collect();

        let mut winners = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(StoreError::DuplicateKey { .. }) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.count_posts().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("murmur.sqlite");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_user(&user("10")).await.unwrap();
            store.put_post(&post("1", "10")).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.count_users().unwrap(), 1);
        assert_eq!(reopened.count_posts().unwrap(), 1);
        assert!(reopened.get_post("1").await.unwrap().is_some());
    }
}
