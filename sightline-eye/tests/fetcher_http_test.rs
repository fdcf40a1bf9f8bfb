//! HTTP model fetcher against a local axum server

use axum::body::Body;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use sightline_eye::error::FetchError;
use sightline_eye::models::{DownloadProgress, HttpModelFetcher, ModelFetcher};
use std::net::SocketAddr;

const MODEL: &[u8] = b"tflite-model-payload-0123456789";

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/models/sized.tflite", get(|| async { MODEL.to_vec() }))
        .route(
            "/models/chunked.tflite",
            get(|| async {
                let parts: Vec<Result<Bytes, std::io::Error>> = MODEL
                    .chunks(8)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Body::from_stream(futures::stream::iter(parts))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fetcher(addr: SocketAddr) -> HttpModelFetcher {
    HttpModelFetcher::new()
        .with_base_url(&format!("http://{}/", addr))
        .unwrap()
}

#[tokio::test]
async fn test_fetch_with_content_length_reports_percent() {
    let addr = serve().await;
    let seen = Mutex::new(Vec::<DownloadProgress>::new());
    let observer = |p: DownloadProgress| seen.lock().push(p);

    let bytes = fetcher(addr).fetch("models/sized.tflite", &observer).await.unwrap();

    assert_eq!(&bytes[..], MODEL);
    let seen = seen.lock();
    let last = seen.last().unwrap();
    assert_eq!(last.bytes_total, Some(MODEL.len() as u64));
    assert_eq!(last.percent(), Some(100.0));
}

#[tokio::test]
async fn test_fetch_chunked_without_content_length() {
    let addr = serve().await;
    let seen = Mutex::new(Vec::<DownloadProgress>::new());
    let observer = |p: DownloadProgress| seen.lock().push(p);

    let bytes = fetcher(addr).fetch("models/chunked.tflite", &observer).await.unwrap();

    assert_eq!(bytes.len(), MODEL.len());
    assert_eq!(&bytes[..], MODEL);
    let seen = seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|p| p.bytes_total.is_none() && p.percent().is_none()));
    assert_eq!(seen.last().unwrap().bytes_loaded, MODEL.len() as u64);
}

#[tokio::test]
async fn test_fetch_absolute_url() {
    let addr = serve().await;
    let url = format!("http://{}/models/sized.tflite", addr);
    let bytes = HttpModelFetcher::new()
        .fetch(&url, &sightline_eye::models::NoProgress)
        .await
        .unwrap();
    assert_eq!(&bytes[..], MODEL);
}

#[tokio::test]
async fn test_fetch_missing_model_reports_path_and_status() {
    let addr = serve().await;
    let result = fetcher(addr)
        .fetch("models/missing.tflite", &sightline_eye::models::NoProgress)
        .await;

    match result {
        Err(err @ FetchError::Status { .. }) => {
            let msg = err.to_string();
            assert!(msg.contains("models/missing.tflite"), "message: {}", msg);
            assert!(msg.contains("404"), "message: {}", msg);
        }
        other => panic!("Expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_relative_path_without_base_url_rejected() {
    let result = HttpModelFetcher::new()
        .fetch("models/sized.tflite", &sightline_eye::models::NoProgress)
        .await;
    assert!(matches!(result, Err(FetchError::InvalidPath { .. })));
}
