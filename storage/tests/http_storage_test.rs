//! `HttpObjectStorage` against a mock storage service.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use plotbook_core::storage::{ObjectStorage, StorageError};
use plotbook_storage::HttpObjectStorage;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "property-images";
const OBJECT: &str = "owner/PROP-TN-20250101001/1735689600000-front.jpg";

#[tokio::test]
async fn test_upload_returns_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/storage/v1/object/{BUCKET}/{OBJECT}")))
        .and(header("authorization", "Bearer service-key"))
        .and(header("content-type", "image/jpeg"))
        .and(body_bytes(vec![1, 2, 3]))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let storage = HttpObjectStorage::new(server.uri(), Some("service-key".to_string()));

    let url = storage.upload(BUCKET, OBJECT, vec![1, 2, 3], "image/jpeg").await.unwrap();

    assert_eq!(url, format!("{}/storage/v1/object/public/{BUCKET}/{OBJECT}", server.uri()));
    assert_eq!(storage.object_path(BUCKET, &url).as_deref(), Some(OBJECT));
}

#[tokio::test]
async fn test_rejected_upload_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409).set_body_string("The resource already exists"))
        .mount(&server)
        .await;
    let storage = HttpObjectStorage::new(server.uri(), None);

    let err = storage.upload(BUCKET, OBJECT, vec![1], "image/jpeg").await.unwrap_err();

    assert_eq!(
        err,
        StorageError::Rejected { status: 409, message: "The resource already exists".to_string() }
    );
}

#[tokio::test]
async fn test_remove_deletes_object() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/storage/v1/object/{BUCKET}/{OBJECT}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let storage = HttpObjectStorage::new(server.uri(), None);

    storage.remove(BUCKET, OBJECT).await.unwrap();
}

#[tokio::test]
async fn test_invalid_paths_never_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;
    let storage = HttpObjectStorage::new(server.uri(), None);

    let err = storage.upload(BUCKET, "../escape.jpg", vec![1], "image/jpeg").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_a_transport_error() {
    let storage = HttpObjectStorage::new("http://127.0.0.1:9", None);
    let err = storage.remove(BUCKET, OBJECT).await.unwrap_err();
    assert!(matches!(err, StorageError::Transport(_)));
}
