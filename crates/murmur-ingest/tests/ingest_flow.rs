//! End-to-end ingestion: connector → pipeline → SQLite on disk.

use futures::stream;
use murmur_ingest::{
    Error, FeedParams, FeedStream, FeedTransport, IngestionPipeline, PersistenceStore, PipelineConfig,
    ReconnectSupervisor, Result, SqliteStore, StreamConnector,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

/// Replays one list of lines per subscription, then keeps later
/// subscriptions open with nothing on them.
#[derive(Default)]
struct ReplayTransport {
    sessions: Mutex<VecDeque<Vec<String>>>,
    opens: AtomicUsize,
}

impl ReplayTransport {
    fn new(sessions: Vec<Vec<String>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            opens: AtomicUsize::new(0),
        }
    }
}

impl FeedTransport for ReplayTransport {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn open(&self, _params: &FeedParams) -> Result<FeedStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let session = self.sessions.lock().pop_front();
        match session {
            Some(lines) => Ok(Box::pin(stream::iter(lines.into_iter().map(Ok::<_, Error>)))),
            None => Ok(Box::pin(stream::pending::<Result<String>>())),
        }
    }
}

fn post_json(id: &str, author: &str) -> Value {
    json!({
        "id_str": id,
        "text": format!("post {}", id),
        "created_at": "Wed Oct 10 20:19:24 +0000 2018",
        "source": "<a href=\"https://example.com\">web</a>",
        "user": {
            "id_str": author,
            "screen_name": format!("u{}", author),
            "followers_count": 12,
            "created_at": "Tue Mar 21 20:50:14 +0000 2006"
        }
    })
}

fn post(id: &str, author: &str) -> String {
    post_json(id, author).to_string()
}

fn repost(id: &str, author: &str, original_id: &str, original_author: &str) -> String {
    let mut value = post_json(id, author);
    value["retweeted_status"] = post_json(original_id, original_author);
    value.to_string()
}

fn fast_retry() -> PipelineConfig {
    PipelineConfig {
        store_retry_attempts: 2,
        store_retry_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn test_feed_to_sqlite() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("murmur.sqlite");
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());

    let transport = Arc::new(ReplayTransport::new(vec![vec![
        repost("1", "10", "2", "20"),
        String::new(),
        r#"{"delete":{"status":{"id_str":"2","user_id_str":"20"}}}"#.to_string(),
        post("5", "50"),
        "not json".to_string(),
        post("5", "50"),
    ]]));

    let (post_tx, post_rx) = mpsc::unbounded_channel();
    let (signal_tx, _signal_rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(transport, FeedParams::default(), post_tx, signal_tx);
    connector.open(1).await.unwrap();
    drop(connector);

    let pipeline = IngestionPipeline::new(Arc::clone(&store), fast_retry());
    let stats = pipeline.run(post_rx).await.unwrap();

    assert_eq!(stats.posts_received, 3);
    assert_eq!(stats.posts_failed, 0);
    assert_eq!(stats.users_inserted, 3);
    assert_eq!(stats.posts_inserted, 3);
    // Second copy of post 5: its author and the post itself.
    assert_eq!(stats.duplicates, 2);

    assert_eq!(store.count_users().unwrap(), 3);
    assert_eq!(store.count_posts().unwrap(), 3);

    let reposted = store.get_post("1").await.unwrap().unwrap();
    assert_eq!(reposted.reposted_post_id.as_deref(), Some("2"));
    assert_eq!(reposted.author_id, "10");

    let original = store.get_post("2").await.unwrap().unwrap();
    assert_eq!(original.reposted_post_id, None);
    assert_eq!(original.author_id, "20");
}

#[tokio::test]
async fn test_rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("murmur.sqlite");

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let pipeline = IngestionPipeline::new(store, fast_retry());
        let post: murmur_core::FeedPost =
            serde_json::from_str(&repost("7", "70", "8", "80")).unwrap();
        pipeline.ingest(&post).await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    assert_eq!(store.count_users().unwrap(), 2);
    assert_eq!(store.count_posts().unwrap(), 2);

    // Replaying the same post against the reopened store writes nothing.
    let pipeline = IngestionPipeline::new(Arc::clone(&store), fast_retry());
    let post: murmur_core::FeedPost = serde_json::from_str(&repost("7", "70", "8", "80")).unwrap();
    let report = pipeline.ingest(&post).await.unwrap();
    assert_eq!(report.users_inserted, 0);
    assert_eq!(report.posts_inserted, 0);
    assert_eq!(report.duplicates, 4);
}

#[tokio::test]
async fn test_supervised_reconnect_keeps_ingesting() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("murmur.sqlite")).unwrap());

    let transport = Arc::new(ReplayTransport::new(vec![
        vec![
            post("1", "10"),
            r#"{"disconnect":{"code":12,"reason":"maintenance"}}"#.to_string(),
        ],
        vec![repost("3", "30", "1", "10")],
    ]));

    let (post_tx, post_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(
        Arc::clone(&transport),
        FeedParams::default(),
        post_tx,
        signal_tx,
    );
    let supervisor = ReconnectSupervisor::new(connector, signal_rx, Duration::from_millis(50));
    let pipeline = IngestionPipeline::new(Arc::clone(&store), fast_retry());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_handle = tokio::spawn(supervisor.run(shutdown_rx));
    let pipeline_handle = tokio::spawn(async move { pipeline.run(post_rx).await });

    let mut waited = Duration::ZERO;
    while store.count_posts().unwrap() < 2 {
        assert!(waited < Duration::from_secs(10), "second subscription never delivered");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }

    shutdown_tx.send(true).unwrap();
    let supervisor_stats = supervisor_handle.await.unwrap();
    let pipeline_stats = pipeline_handle.await.unwrap().unwrap();

    assert!(supervisor_stats.subscriptions >= 2);
    assert!(transport.opens.load(Ordering::SeqCst) >= 2);
    assert_eq!(pipeline_stats.posts_received, 2);
    assert_eq!(store.count_users().unwrap(), 2);
    assert_eq!(store.count_posts().unwrap(), 2);
}
