use bytes::Bytes;
use micro_coord::source::Document;
use micro_coord::source::Encoder;
use micro_coord::source::JsonEncoder;
use micro_coord::MemStore;
use micro_coord::Source;
use micro_coord::Store;

use crate::common::source;
use crate::common::wait_for_watchers;
use crate::common::within;

async fn put(
    store: &MemStore,
    key: &str,
    value: &str,
) {
    store
        .put(&format!("/micro/config/{}", key), Bytes::from(value.to_string()), None)
        .await
        .unwrap();
}

fn decode(data: &[u8]) -> Document {
    JsonEncoder.decode(data).unwrap()
}

/// Operators edit individual keys; the application sees the whole document
/// after every edit, identical to what a fresh read would return.
#[tokio::test]
async fn test_watched_document_tracks_key_edits() {
    let store = MemStore::new();
    put(&store, "database/address", r#""10.0.0.1""#).await;
    put(&store, "database/port", "3306").await;
    let source = source(&store);

    let baseline = source.read().await.unwrap();
    let mut watcher = source.watch().await.unwrap();

    put(&store, "cache/ttl", "30").await;
    let added = within(watcher.next()).await.unwrap();
    assert_ne!(added, baseline);
    assert_eq!(added, source.read().await.unwrap());
    assert_eq!(
        decode(&added.data).get(&["cache", "ttl"]),
        Some(&Document::Int(30))
    );

    store.delete("/micro/config/database/port").await.unwrap();
    let removed = within(watcher.next()).await.unwrap();
    let document = decode(&removed.data);
    assert_eq!(document.get(&["database", "port"]), None);
    assert_eq!(
        document.get(&["database", "address"]),
        Some(&Document::String("10.0.0.1".to_string()))
    );

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_watch_recovers_after_store_drops_subscriptions() {
    let store = MemStore::new();
    put(&store, "feature/enabled", "false").await;
    let source = source(&store);
    let mut watcher = source.watch().await.unwrap();

    store.disconnect_watchers();
    wait_for_watchers(&store, 1).await;

    put(&store, "feature/enabled", "true").await;
    let change_set = within(watcher.next()).await.unwrap();
    assert_eq!(&change_set.data[..], br#"{"feature":{"enabled":true}}"#);

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_compaction_resyncs_from_full_read() {
    let store = MemStore::new();
    put(&store, "a/b", "1").await;
    let source = source(&store);
    let mut watcher = source.watch().await.unwrap();

    store.compact(store.revision());
    let resynced = within(watcher.next()).await.unwrap();

    assert_eq!(&resynced.data[..], br#"{"a":{"b":1}}"#);
    assert_eq!(resynced.checksum, resynced.sum());
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_read_round_trips_through_encoder() {
    let store = MemStore::new();
    put(&store, "service/limits", r#"{"burst":20,"rate":1.5,"paths":["/a","/b"]}"#).await;
    put(&store, "service/name", r#""greeter""#).await;

    let change_set = source(&store).read().await.unwrap();
    let reencoded = JsonEncoder.encode(&decode(&change_set.data)).unwrap();

    assert_eq!(reencoded, change_set.data);
    assert_eq!(change_set.source, "kv");
    assert_eq!(change_set.format, "json");
}
