//! Rollback Integration Tests
//!
//! Failed creations and failed uploads must not leave anything that looks
//! like a complete record or file.

mod common;

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use content_store::{ContentId, ContentStore, StoreError, StoreSettings};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use common::{files_below, test_user, Faults, InstrumentedFileSystem};

fn store_with_faults(
    temp: &TempDir,
    faults: Faults,
) -> (ContentStore, Arc<InstrumentedFileSystem>) {
    let fs = Arc::new(InstrumentedFileSystem::with_faults(faults));
    let store = ContentStore::with_file_system(StoreSettings::new(temp.path()), fs.clone());
    (store, fs)
}

/// Yields a few bytes, then fails like a dropped connection
struct BrokenReader {
    sent: bool,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        self.sent = true;
        buf.put_slice(b"part");
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_failed_content_write_removes_directory() {
    let temp = TempDir::new().unwrap();
    let (store, _fs) = store_with_faults(
        &temp,
        Faults {
            fail_document_named: Some("content.json".to_string()),
            ..Faults::default()
        },
    );
    let id = ContentId::new(77).unwrap();

    let result = store
        .create_content(&json!({"title": "x"}), &json!({"body": "y"}), &test_user(), Some(id))
        .await;

    match result {
        Err(StoreError::ContentCreation { id: failed, source }) => {
            assert_eq!(failed, id);
            assert!(matches!(*source, StoreError::StorageIo { .. }));
        }
        other => panic!("expected creation error, got {:?}", other),
    }
    assert!(!temp.path().join("77").exists());
    assert!(!store.content_exists(id).await.unwrap());
}

#[tokio::test]
async fn test_failed_metadata_write_removes_directory() {
    let temp = TempDir::new().unwrap();
    let (store, _fs) = store_with_faults(
        &temp,
        Faults {
            fail_document_named: Some("h5p.json".to_string()),
            ..Faults::default()
        },
    );

    let result = store
        .create_content(&json!({}), &json!({}), &test_user(), None)
        .await;

    assert!(matches!(result, Err(StoreError::ContentCreation { .. })));
    assert!(files_below(temp.path()).is_empty());
    assert!(store.list_content().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rollback_failure_keeps_original_error() {
    let temp = TempDir::new().unwrap();
    let (store, _fs) = store_with_faults(
        &temp,
        Faults {
            fail_document_named: Some("content.json".to_string()),
            fail_remove_recursive: true,
            ..Faults::default()
        },
    );

    let result = store
        .create_content(&json!({}), &json!({}), &test_user(), None)
        .await;

    match result {
        Err(StoreError::ContentCreation { source, .. }) => {
            assert!(source.to_string().contains("write_document"));
        }
        other => panic!("expected creation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_existing_directory_is_not_rolled_back() {
    let temp = TempDir::new().unwrap();
    let id = ContentId::new(5).unwrap();

    // Seed a record through a healthy store
    let healthy = ContentStore::new(StoreSettings::new(temp.path()));
    healthy
        .create_content(&json!({}), &json!({}), &test_user(), Some(id))
        .await
        .unwrap();
    healthy
        .add_content_file(id, "keep.txt", &mut &b"keep"[..], &test_user())
        .await
        .unwrap();

    let (store, _fs) = store_with_faults(
        &temp,
        Faults {
            fail_document_named: Some("content.json".to_string()),
            ..Faults::default()
        },
    );
    let result = store
        .create_content(&json!({}), &json!({}), &test_user(), Some(id))
        .await;

    assert!(matches!(result, Err(StoreError::ContentCreation { .. })));
    assert!(temp.path().join("5").join("content").join("keep.txt").exists());
}

#[tokio::test]
async fn test_broken_upload_leaves_no_file() {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(StoreSettings::new(temp.path()));
    let user = test_user();
    let id = store
        .create_content(&json!({}), &json!({}), &user, None)
        .await
        .unwrap();

    let result = store
        .add_content_file(id, "video/v.mp4", &mut BrokenReader { sent: false }, &user)
        .await;

    assert!(matches!(result, Err(StoreError::StorageIo { .. })));
    assert!(store.get_content_files(id, &user).await.unwrap().is_empty());
    assert!(!store.content_file_exists(id, "video/v.mp4").await.unwrap());

    // Only the two documents remain on disk
    assert_eq!(files_below(&temp.path().join(id.to_string())).len(), 2);
}

#[tokio::test]
async fn test_broken_upload_keeps_previous_version() {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(StoreSettings::new(temp.path()));
    let user = test_user();
    let id = store
        .create_content(&json!({}), &json!({}), &user, None)
        .await
        .unwrap();
    store
        .add_content_file(id, "doc.txt", &mut &b"complete"[..], &user)
        .await
        .unwrap();

    let result = store
        .add_content_file(id, "doc.txt", &mut BrokenReader { sent: false }, &user)
        .await;
    assert!(result.is_err());

    let mut stream = store.get_content_file_stream(id, "doc.txt", &user).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "complete");
}

#[tokio::test]
async fn test_failed_rename_cleans_up_upload() {
    let temp = TempDir::new().unwrap();
    let healthy = ContentStore::new(StoreSettings::new(temp.path()));
    let user = test_user();
    let id = healthy
        .create_content(&json!({}), &json!({}), &user, None)
        .await
        .unwrap();

    let (store, _fs) = store_with_faults(
        &temp,
        Faults {
            fail_rename: true,
            ..Faults::default()
        },
    );
    let result = store
        .add_content_file(id, "a/b.txt", &mut &b"bytes"[..], &user)
        .await;

    assert!(matches!(result, Err(StoreError::StorageIo { .. })));
    let leftovers: Vec<_> = files_below(&temp.path().join(id.to_string()).join("content"))
        .into_iter()
        .filter(|p| p.to_string_lossy().contains(".upload-"))
        .collect();
    assert!(leftovers.is_empty(), "partial uploads left: {:?}", leftovers);
}

#[tokio::test]
async fn test_abandoned_create_removes_directory() {
    let temp = TempDir::new().unwrap();
    let (store, _fs) = store_with_faults(
        &temp,
        Faults {
            hang_document_named: Some("content.json".to_string()),
            ..Faults::default()
        },
    );
    let id = ContentId::new(31).unwrap();
    let user = test_user();

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        store.create_content(&json!({"title": "x"}), &json!({}), &user, Some(id)),
    )
    .await;
    assert!(result.is_err(), "create should still be pending");

    // Removal runs on a spawned task once the future is dropped
    let dir = temp.path().join("31");
    for _ in 0..100 {
        if !dir.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!dir.exists());
    assert!(!store.content_exists(id).await.unwrap());
}
