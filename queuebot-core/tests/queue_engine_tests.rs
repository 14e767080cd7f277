// tests/queue_engine_tests.rs

use std::sync::Arc;

use queuebot_core::queue::{QueueEngine, StateKind, StateStore};
use queuebot_core::QueueError;

#[tokio::test]
async fn concurrent_joins_never_duplicate() {
    let queue = Arc::new(QueueEngine::new("race"));
    queue.enable();

    let mut handles = Vec::new();
    for i in 0..64 {
        let q = queue.clone();
        handles.push(tokio::spawn(async move {
            // Every user tries twice with different casing.
            let name = format!("user{}", i % 16);
            let upper = name.to_uppercase();
            let a = q.add(&name, false);
            let b = q.add(&upper, false);
            (a, b)
        }));
    }

    let mut successes = 0;
    for h in handles {
        let (a, b) = h.await.unwrap();
        for r in [a, b] {
            match r {
                Ok(_) => successes += 1,
                Err(QueueError::AlreadyInQueue(_)) => {}
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
    }

    assert_eq!(successes, 16);
    assert_eq!(queue.size(), 16);
    let positions: Vec<usize> = (0..16)
        .map(|i| queue.position(&format!("USER{i}")).unwrap().unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(sorted, (1..=16).collect::<Vec<_>>());
}

#[tokio::test]
async fn auto_save_reflects_the_last_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path(), "persist");
    let (queue, worker) = QueueEngine::spawn_persistent(store.clone());

    queue.enable();
    for name in ["a", "b", "c", "d", "e"] {
        queue.add(name, false).unwrap();
    }
    queue.move_user("e", 1).unwrap();
    queue.pop().unwrap();
    queue.flush().await.unwrap();

    let saved = store.load(StateKind::Auto).await.unwrap().expect("auto-save written");
    assert!(saved.enabled);
    assert_eq!(saved.usernames(), vec!["a", "b", "c", "d"]);
    assert_eq!(saved.version, queue.snapshot().version);

    drop(queue);
    worker.await.unwrap();
}

#[tokio::test]
async fn restore_rejects_another_channels_file() {
    let dir = tempfile::tempdir().unwrap();

    let (other, _w) = QueueEngine::spawn_persistent(StateStore::new(dir.path(), "other"));
    other.enable();
    other.add("x", false).unwrap();
    other.flush().await.unwrap();

    // Same directory, but the file carries the wrong channel inside it.
    std::fs::rename(
        dir.path().join("queue_state_other.json"),
        dir.path().join("queue_state_mine.json"),
    )
    .unwrap();

    let (mine, _w2) = QueueEngine::spawn_persistent(StateStore::new(dir.path(), "mine"));
    let err = mine.recover(StateKind::Auto).await.unwrap_err();
    assert!(
        matches!(
            err,
            queuebot_core::Error::Queue(QueueError::ChannelMismatch { .. })
        ),
        "{err:?}"
    );
    assert!(!mine.is_enabled());
}
