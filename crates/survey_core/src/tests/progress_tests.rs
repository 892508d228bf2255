use storage::MemoryStore;

use super::*;
use crate::test_support::FailingStore;

#[test]
fn counts_parse_like_leading_integers() {
    assert_eq!(parse_count("3"), 3);
    assert_eq!(parse_count(" 12 "), 12);
    assert_eq!(parse_count("7 segments"), 7);
    assert_eq!(parse_count("-4"), 0);
    assert_eq!(parse_count("many"), 0);
    assert_eq!(parse_count(""), 0);
}

#[tokio::test]
async fn set_clamps_and_get_reads_back() {
    let progress = TaskProgress::new(Arc::new(MemoryStore::new()));
    assert_eq!(progress.get().await, 0);

    assert_eq!(progress.set(5).await, 5);
    assert_eq!(progress.get().await, 5);

    assert_eq!(progress.set(-2).await, 0);
    assert_eq!(progress.get().await, 0);
}

#[tokio::test]
async fn subscribers_see_every_stored_count() {
    let store = Arc::new(MemoryStore::new());
    let progress = TaskProgress::new(store.clone());
    let mut updates = progress.subscribe();

    progress.set(2).await;
    store.set("unrelated", "9").await.expect("set");
    progress.set(3).await;
    store.remove(TASK_PROGRESS_STORAGE_KEY).await.expect("remove");

    assert_eq!(updates.next().await, Some(2));
    assert_eq!(updates.next().await, Some(3));
    assert_eq!(updates.next().await, Some(0));
}

#[tokio::test]
async fn storage_failures_read_as_zero() {
    let progress = TaskProgress::new(Arc::new(FailingStore));
    assert_eq!(progress.set(4).await, 4);
    assert_eq!(progress.get().await, 0);
}
