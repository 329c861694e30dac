use bytes::Bytes;
use futures::StreamExt;
use file_pipeline::object_store::{LocalStore, ObjectStore, ObjectStoreError};

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("hello world");
    store.put("test-key", data.clone()).await.unwrap();

    let retrieved = store.get("test-key").await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_local_store_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(!store.exists("missing").await.unwrap());

    store.put("present", Bytes::from("data")).await.unwrap();
    assert!(store.exists("present").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("to-delete", Bytes::from("data")).await.unwrap();
    store.delete("to-delete").await.unwrap();
    assert!(!store.exists("to-delete").await.unwrap());

    // Deleting a nonexistent key should not error
    store.delete("to-delete").await.unwrap();
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.get("missing").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_writer_finish_makes_object_visible() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let mut writer = store.writer("incremental").await.unwrap();
    writer.write_chunk(Bytes::from("hello ")).await.unwrap();

    // Nothing readable until finish
    assert!(!store.exists("incremental").await.unwrap());

    writer.write_chunk(Bytes::from("world")).await.unwrap();
    writer.finish().await.unwrap();

    let data = store.get("incremental").await.unwrap();
    assert_eq!(data, Bytes::from("hello world"));
}

#[tokio::test]
async fn test_writer_abort_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let mut writer = store.writer("aborted").await.unwrap();
    writer.write_chunk(Bytes::from("partial bytes")).await.unwrap();
    writer.abort().await.unwrap();

    assert!(!store.exists("aborted").await.unwrap());
    assert!(matches!(
        store.get("aborted").await,
        Err(ObjectStoreError::NotFound(_))
    ));

    // No stray files, partial or otherwise
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_reader_streams_full_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let payload = Bytes::from(vec![7u8; 256 * 1024]);
    store.put("big", payload.clone()).await.unwrap();

    let mut stream = store.reader("big").await.unwrap();
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(Bytes::from(collected), payload);
}

#[tokio::test]
async fn test_reader_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(matches!(
        store.reader("missing").await,
        Err(ObjectStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_local_store_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("key", Bytes::from("first")).await.unwrap();
    store.put("key", Bytes::from("second")).await.unwrap();

    let data = store.get("key").await.unwrap();
    assert_eq!(data, Bytes::from("second"));
}
