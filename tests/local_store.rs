use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use ranktree::{
    Config, Database, DocumentStore, ErrorKind, IsolationLevel, LocalStore, Namespace, RankConfig,
    Transaction, TransactionConfig, TransactionRunner,
};

fn ns() -> Namespace {
    Namespace::new("default", "docs")
}

fn deltas(field: &str, delta: i64) -> Vec<(String, i64)> {
    vec![(field.to_string(), delta)]
}

#[tokio::test]
async fn test_scores_survive_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(Config::durable(dir.path())).unwrap();
        let engine = db.rank_engine(RankConfig::new(1, 100, 8)).unwrap();
        for score in [100, 100, 97, 50, 8] {
            engine.add_score(score).await.unwrap();
        }
        engine.remove_score(8).await.unwrap();
        db.sync().unwrap();
    }

    let db = Database::open(Config::durable(dir.path())).unwrap();
    let engine = db.rank_engine(RankConfig::new(1, 100, 8)).unwrap();
    assert_eq!(engine.count().await.unwrap(), 4);
    assert_eq!(engine.count_by_score(100).await.unwrap(), 2);
    assert_eq!(engine.get_rank_by_score(97).await.unwrap(), 3);
}

#[tokio::test]
async fn test_reopen_after_checkpoint_replays_tail() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(Config::durable(dir.path())).unwrap();
        let engine = db.rank_engine(RankConfig::new(1, 1000, 10)).unwrap();
        for score in 1..=20 {
            engine.add_score(score * 10).await.unwrap();
        }
        db.checkpoint().unwrap();
        for score in 1..=5 {
            engine.add_score(score).await.unwrap();
        }
    }

    let db = Database::open(Config::durable(dir.path())).unwrap();
    let engine = db.rank_engine(RankConfig::new(1, 1000, 10)).unwrap();
    assert_eq!(engine.count().await.unwrap(), 25);
    assert_eq!(engine.get_rank_by_score(5).await.unwrap(), 21);
}

#[tokio::test]
async fn test_automatic_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        checkpoint_interval: 3,
        ..Config::durable(dir.path())
    };

    {
        let db = Database::open(config.clone()).unwrap();
        let engine = db.rank_engine(RankConfig::new(1, 100, 4)).unwrap();
        for score in 1..=10 {
            engine.add_score(score).await.unwrap();
        }
    }

    assert!(dir.path().join("meta").join("checkpoint.bin").exists());

    let db = Database::open(config).unwrap();
    let engine = db.rank_engine(RankConfig::new(1, 100, 4)).unwrap();
    assert_eq!(engine.count().await.unwrap(), 10);
}

#[tokio::test]
async fn test_meta_record_persists_configuration() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(Config::durable(dir.path())).unwrap();
        db.rank_engine(RankConfig::new(1, 100, 8)).unwrap().init().await.unwrap();
    }

    let db = Database::open(Config::durable(dir.path())).unwrap();
    let err = db
        .rank_engine(RankConfig::new(1, 100, 16))
        .unwrap()
        .init()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigurationMismatch);
}

#[test]
fn test_data_dir_is_locked() {
    let dir = TempDir::new().unwrap();
    let _first = LocalStore::open(&Config::durable(dir.path())).unwrap();

    let err = LocalStore::open(&Config::durable(dir.path())).err().unwrap();
    assert_eq!(err.kind, ErrorKind::Io);
}

#[tokio::test]
async fn test_set_on_insert_keeps_first_values() {
    let store = LocalStore::in_memory();
    let first = BTreeMap::from([("a".to_string(), 1)]);
    let second = BTreeMap::from([("a".to_string(), 2)]);

    let stored = store.upsert_set_on_insert(&ns(), "meta", &first).await.unwrap();
    assert_eq!(stored.get("a"), 1);
    let stored = store.upsert_set_on_insert(&ns(), "meta", &second).await.unwrap();
    assert_eq!(stored.get("a"), 1);
    assert_eq!(store.document_count(&ns()), 1);
}

#[tokio::test]
async fn test_find_by_ids_skips_absent() {
    let store = LocalStore::in_memory();
    store.upsert_increment(&ns(), "b", &deltas("x", 2), None).await.unwrap();
    store.upsert_increment(&ns(), "a", &deltas("x", 1), None).await.unwrap();

    let ids = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
    let docs = store.find_by_ids(&ns(), &ids, None).await.unwrap();
    let found: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(found, vec!["a", "b"]);
}

#[tokio::test]
async fn test_transaction_reads_own_writes() {
    let store = LocalStore::in_memory();
    let tx = Transaction::begin(IsolationLevel::Serializable);

    store.upsert_increment(&ns(), "a", &deltas("x", 3), Some(&tx)).await.unwrap();
    let doc = store.find_by_id(&ns(), "a", Some(&tx)).await.unwrap().unwrap();
    assert_eq!(doc.get("x"), 3);
    assert!(store.find_by_id(&ns(), "a", None).await.unwrap().is_none());

    store.commit(&tx).await.unwrap();
    let doc = store.find_by_id(&ns(), "a", None).await.unwrap().unwrap();
    assert_eq!(doc.get("x"), 3);
}

#[tokio::test]
async fn test_stale_read_conflicts() {
    let store = LocalStore::in_memory();
    store.upsert_increment(&ns(), "a", &deltas("x", 1), None).await.unwrap();

    let tx = Transaction::begin(IsolationLevel::Serializable);
    store.find_by_id(&ns(), "a", Some(&tx)).await.unwrap();
    store.upsert_increment(&ns(), "a", &deltas("x", 1), None).await.unwrap();
    store.upsert_increment(&ns(), "b", &deltas("x", 1), Some(&tx)).await.unwrap();

    let err = store.commit(&tx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::WriteConflict);
    assert!(err.is_transient());
    assert!(store.find_by_id(&ns(), "b", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_committed_ignores_stale_reads() {
    let store = LocalStore::in_memory();
    store.upsert_increment(&ns(), "a", &deltas("x", 1), None).await.unwrap();

    let tx = Transaction::begin(IsolationLevel::ReadCommitted);
    store.find_by_id(&ns(), "a", Some(&tx)).await.unwrap();
    store.upsert_increment(&ns(), "a", &deltas("x", 1), None).await.unwrap();
    store.upsert_increment(&ns(), "b", &deltas("x", 1), Some(&tx)).await.unwrap();

    store.commit(&tx).await.unwrap();
}

#[tokio::test]
async fn test_runner_gives_up_after_max_retry() {
    let store = Arc::new(LocalStore::in_memory());
    let runner = TransactionRunner::new(
        store.clone(),
        TransactionConfig {
            max_retry: Some(2),
            ..TransactionConfig::default()
        },
    );
    let attempts = AtomicU32::new(0);

    let (store_ref, attempts_ref) = (&store, &attempts);
    let err = runner
        .start(|tx| async move {
            attempts_ref.fetch_add(1, Ordering::SeqCst);
            store_ref.find_by_id(&ns(), "a", Some(&tx)).await?;
            // A concurrent writer sneaks in before every commit
            store_ref.upsert_increment(&ns(), "a", &deltas("x", 1), None).await?;
            store_ref.upsert_increment(&ns(), "a", &deltas("x", 1), Some(&tx)).await
        })
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind, ErrorKind::TransactionExhausted);
    assert_eq!(err.context, "Transaction aborted with a retry of 2 times.");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_runner_reports_explicit_abort() {
    let store = Arc::new(LocalStore::in_memory());
    let runner = TransactionRunner::new(store.clone(), TransactionConfig::default());

    let store_ref = &store;
    let result = runner
        .start(|tx| async move {
            store_ref.upsert_increment(&ns(), "a", &deltas("x", 1), Some(&tx)).await?;
            tx.abort();
            Ok::<_, ranktree::Error>(7)
        })
        .await
        .unwrap();

    assert_eq!(result.value, 7);
    assert!(!result.committed);
    assert!(store.find_by_id(&ns(), "a", None).await.unwrap().is_none());
}
