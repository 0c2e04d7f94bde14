//! End-to-end flows over the real two-tier store in a temp directory.

use std::sync::Arc;

use slate_core::AppConfig;
use slate_domain::{
    from_canonical, to_canonical, BoardState, CardDraft, ColumnId, Priority,
};
use slate_persistence::{
    BoardStore, DurableStore, PersistenceCoordinator, SnapshotOptions, SnapshotSource,
    StorageMode,
};
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn coordinator(store: Arc<DurableStore>) -> PersistenceCoordinator<DurableStore> {
    let config = AppConfig {
        autosave_debounce_ms: Some(20),
        ..Default::default()
    };
    PersistenceCoordinator::with_config(store, &config)
}

fn sample_board() -> BoardState {
    let mut board = BoardState::with_default_columns();
    board.add_card(
        ColumnId::Todo,
        CardDraft {
            title: Some("plan week".to_string()),
            priority: Some(Priority::High),
            ..Default::default()
        },
    ).unwrap();
    board.add_card(
        ColumnId::Wip,
        CardDraft {
            title: Some("write report".to_string()),
            ..Default::default()
        },
    ).unwrap();
    board
}

#[tokio::test]
async fn test_full_save_snapshot_restore_cycle() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = Arc::new(DurableStore::new(dir.path()));
    assert_eq!(store.init().await, StorageMode::Transactional);
    let coordinator = coordinator(Arc::clone(&store));

    // Save the initial board and snapshot it.
    let board = sample_board();
    assert!(coordinator.flush(&board).await);
    let restore_point = coordinator
        .archive()
        .create_snapshot(&board, SnapshotOptions::default())
        .await
        .unwrap();

    // Keep working, then restore the snapshot over the diverged board.
    let mut diverged = board.clone();
    diverged.clear_done();
    let card_id = diverged
        .add_card(
            ColumnId::Done,
            CardDraft {
                title: Some("throwaway".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(coordinator.flush(&diverged).await);

    let outcome = coordinator.restore_from_backup(&diverged, &restore_point).await;
    assert!(outcome.saved);
    assert_eq!(outcome.state, board);
    assert!(!outcome.state.cards.contains_key(&card_id));
    // The diverged state was captured before being replaced.
    let pre_restore = outcome.snapshot.unwrap();
    assert_eq!(pre_restore.source, SnapshotSource::Restore);
    assert!(pre_restore.state.tasks_by_id.contains_key(&card_id));

    // What is on disk now is the restored board.
    assert_eq!(store.load_board().await.unwrap(), board);

    let status = coordinator.status().await;
    assert!(status.last_saved_at.is_some());
    assert!(status.last_snapshot_at.is_some());
    assert!(status.last_restore_at.is_some());
    assert_eq!(status.storage_mode, StorageMode::Transactional);
    assert!(!status.save_failed);
}

#[tokio::test]
async fn test_archive_listing_and_delete_protection_over_sqlite() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = Arc::new(DurableStore::new(dir.path()));
    store.init().await;
    let coordinator = coordinator(Arc::clone(&store));
    let archive = coordinator.archive();

    let board = sample_board();
    let first = archive
        .create_snapshot(&board, SnapshotOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = archive
        .create_snapshot(&board, SnapshotOptions::with_source(SnapshotSource::Auto))
        .await
        .unwrap();

    let listed = archive.all_backups().await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id, "newest first");
    assert_eq!(listed[1].id, first.id);

    assert!(!archive.delete_snapshot(&second.id).await);
    assert!(archive.delete_snapshot(&first.id).await);
    assert_eq!(archive.all_backups().await.len(), 1);
}

#[tokio::test]
async fn test_debounced_autosave_lands_on_disk() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = Arc::new(DurableStore::new(dir.path()));
    store.init().await;
    let coordinator = coordinator(Arc::clone(&store));

    let board = sample_board();
    coordinator.schedule_save(board.clone());
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_eq!(store.load_board().await.unwrap(), board);
}

#[tokio::test]
async fn test_failover_to_fallback_preserves_round_trip() {
    init_tracing();
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"in the way").unwrap();

    let store = Arc::new(DurableStore::with_paths(
        blocker.join("slate.db"),
        dir.path().join("fallback"),
    ));
    assert_eq!(store.init().await, StorageMode::Fallback);

    let coordinator = coordinator(Arc::clone(&store));
    let board = sample_board();
    assert!(coordinator.flush(&board).await);
    assert_eq!(store.load_board().await.unwrap(), board);
    assert_eq!(coordinator.status().await.storage_mode, StorageMode::Fallback);
}

#[tokio::test]
async fn test_import_export_file_round_trip() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = Arc::new(DurableStore::new(dir.path()));
    store.init().await;
    let coordinator = coordinator(Arc::clone(&store));

    let board = sample_board();
    let export_file = dir.path().join("slate-export.json");
    assert!(coordinator.export_state(&board, &export_file).await);

    // The exported document is the canonical wire format.
    let payload: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export_file).unwrap()).unwrap();
    assert_eq!(payload["version"], 1);
    assert_eq!(from_canonical(&payload).unwrap(), board);

    // Importing it over an empty board reproduces the original.
    let empty = BoardState::with_default_columns();
    let outcome = coordinator.import_state(&empty, &payload).await.unwrap();
    assert_eq!(outcome.state, board);
    assert!(outcome.saved);
}

#[tokio::test]
async fn test_legacy_unversioned_import_matches_versioned() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = Arc::new(DurableStore::new(dir.path()));
    store.init().await;
    let coordinator = coordinator(Arc::clone(&store));

    let board = sample_board();
    let versioned = serde_json::to_value(to_canonical(&board)).unwrap();
    let legacy = serde_json::json!({
        "cards": serde_json::to_value(&board.cards).unwrap(),
        "columns": serde_json::to_value(&board.columns).unwrap(),
    });

    let empty = BoardState::with_default_columns();
    let from_legacy = coordinator.import_state(&empty, &legacy).await.unwrap();
    let from_versioned = coordinator.import_state(&empty, &versioned).await.unwrap();
    assert_eq!(from_legacy.state, from_versioned.state);
    assert_eq!(from_legacy.state, board);
}

#[tokio::test]
async fn test_auto_export_then_reminder_flow() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = Arc::new(DurableStore::new(dir.path()));
    store.init().await;
    let coordinator = coordinator(Arc::clone(&store));
    let board = sample_board();

    // Overdue with a registered file: exported silently.
    let backup_file = dir.path().join("auto-backup.json");
    store.set_export_path(Some(backup_file.clone())).await;
    let check = coordinator
        .check_backup_reminder(&board, chrono::Utc::now())
        .await;
    assert_eq!(check, slate_persistence::ReminderCheck::AutoExported);
    assert!(backup_file.exists());

    // Immediately afterwards the export is fresh.
    let check = coordinator
        .check_backup_reminder(&board, chrono::Utc::now())
        .await;
    assert_eq!(check, slate_persistence::ReminderCheck::UpToDate);
}
