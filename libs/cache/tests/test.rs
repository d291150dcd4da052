use std::time::Duration;

use hv_cache::Cache;

#[tokio::test]
async fn test_set_and_get() {
    let cache = Cache::<String, u32>::builder().build();
    cache.set("a".to_string(), 1).await;

    assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    assert_eq!(cache.get("b".to_string()).await, None);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let cache = Cache::<&'static str, u32>::builder().build();
    cache
        .set_with_ttl("short", 1, Duration::from_millis(50))
        .await;

    assert!(cache.ttl("short").await.is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(cache.get("short").await, None);
    assert_eq!(cache.ttl("short").await, None);
}

#[tokio::test]
async fn test_set_refreshes_expiry() {
    let cache = Cache::<&'static str, u32>::builder().build();
    cache.set_with_ttl("k", 1, Duration::from_millis(60)).await;

    tokio::time::sleep(Duration::from_millis(40)).await;
    cache.set_with_ttl("k", 2, Duration::from_millis(60)).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(cache.get("k").await, Some(2));
}

#[tokio::test]
async fn test_default_expiry_from_builder() {
    let cache = Cache::<u8, u8>::builder()
        .expiry(Duration::from_millis(30))
        .build();
    cache.set(1, 1).await;

    let ttl = cache.ttl(1).await.unwrap();
    assert!(ttl <= Duration::from_millis(30));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_invalidate() {
    let cache = Cache::<u8, &'static str>::builder().build();
    cache.set(1, "one").await;

    assert_eq!(cache.invalidate(1).await, Some("one"));
    assert_eq!(cache.invalidate(1).await, None);
    assert_eq!(cache.get(1).await, None);
}

#[tokio::test]
async fn test_invalidate_all_counts_live_entries() {
    let cache = Cache::<u8, u8>::builder().build();
    cache.set(1, 1).await;
    cache.set(2, 2).await;
    cache.set_with_ttl(3, 3, Duration::from_millis(1)).await;

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(cache.invalidate_all().await, 2);
    assert_eq!(cache.len().await, 0);
}

#[tokio::test]
async fn test_entries_snapshot() {
    let cache = Cache::<u8, u8>::builder().build();
    cache.set_with_ttl(1, 10, Duration::from_secs(60)).await;
    cache.set_with_ttl(2, 20, Duration::from_millis(1)).await;

    tokio::time::sleep(Duration::from_millis(20)).await;

    let entries = cache.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, 1);
    assert_eq!(entries[0].value, 10);
    assert!(entries[0].remaining > Duration::from_secs(59));
}

#[tokio::test]
async fn test_capacity_evicts_soonest_to_expire() {
    let cache = Cache::<u8, u8>::builder().max_capacity(2).build();
    cache.set_with_ttl(1, 1, Duration::from_secs(10)).await;
    cache.set_with_ttl(2, 2, Duration::from_secs(60)).await;
    cache.set_with_ttl(3, 3, Duration::from_secs(30)).await;

    assert_eq!(cache.get(1).await, None);
    assert_eq!(cache.get(2).await, Some(2));
    assert_eq!(cache.get(3).await, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clones_share_state() {
    let cache = Cache::<u32, u32>::builder().build();

    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.set(i, i * 2).await }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.len().await, 16);
    assert_eq!(cache.get(7).await, Some(14));
}
