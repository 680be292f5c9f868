use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dropgate_index::MemoryIndex;
use dropgate_server::build_router;
use dropgate_server::config::ServerConfig;
use dropgate_server::routes::AppState;
use dropgate_server::storage::Storage;
use tower::ServiceExt;

async fn test_state(max_file_size_bytes: u64) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let temp_dir = dir.path().join("tmp");
    let storage = Arc::new(Storage::new(upload_dir.clone(), temp_dir.clone(), false).await.unwrap());

    let mut config = ServerConfig::from_env().unwrap_or_else(|_| ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        upload_dir,
        temp_dir,
        db_path: None,
        enable_e2ee: true,
        max_file_size_bytes,
        max_lifetime_hours: 24,
        chunk_size_bytes: 5 * 1024 * 1024,
        rate_limit_window_ms: 0,
        rate_limit_max_requests: 0,
        preserve_uploads: false,
        zombie_cleanup_interval_ms: 0,
        ttl_sweep_interval_secs: 60,
        server_name: "dropgate".into(),
        server_version: "1.0.0".into(),
        peerjs_path: "/peerjs".into(),
        ice_servers: vec![],
    });
    config.max_file_size_bytes = max_file_size_bytes;
    config.enable_e2ee = true;

    let state = AppState {
        index: Arc::new(MemoryIndex::new()),
        storage,
        config: Arc::new(config),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };
    (state, dir)
}

#[tokio::test]
async fn plain_happy_path_round_trips_and_is_single_download() {
    let (state, _dir) = test_state(0).await;
    let app = build_router(state);

    let bytes: Vec<u8> = (0..=255u16).map(|b| b as u8).collect();

    let init_body = serde_json::json!({
        "filename": "test.bin",
        "lifetime": 3_600_000u64,
        "isEncrypted": false,
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/upload/init")
                .header("content-type", "application/json")
                .body(Body::from(init_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let upload_id = parsed["uploadId"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::post("/upload/chunk")
                .header("x-upload-id", &upload_id)
                .header("x-file-offset", "0")
                .body(Body::from(bytes.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let complete_body = serde_json::json!({ "uploadId": upload_id });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/upload/complete")
                .header("content-type", "application/json")
                .body(Body::from(complete_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let file_id = parsed["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(Request::get(format!("/{file_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("test.bin"));
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), bytes.as_slice());

    // Give the drop-triggered deletion task a chance to run.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let resp = app
        .oneshot(Request::get(format!("/{file_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zero_byte_upload_is_rejected_at_complete() {
    let (state, _dir) = test_state(0).await;
    let app = build_router(state);

    let init_body = serde_json::json!({
        "filename": "empty.bin",
        "lifetime": 0u64,
        "isEncrypted": false,
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/upload/init")
                .header("content-type", "application/json")
                .body(Body::from(init_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let upload_id = parsed["uploadId"].as_str().unwrap().to_string();

    let complete_body = serde_json::json!({ "uploadId": upload_id });
    let resp = app
        .oneshot(
            Request::post("/upload/complete")
                .header("content-type", "application/json")
                .body(Body::from(complete_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_chunk_is_rejected_with_413() {
    let (state, _dir) = test_state(10).await;
    let app = build_router(state);

    let init_body = serde_json::json!({
        "filename": "big.bin",
        "lifetime": 0u64,
        "isEncrypted": false,
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/upload/init")
                .header("content-type", "application/json")
                .body(Body::from(init_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let upload_id = parsed["uploadId"].as_str().unwrap().to_string();

    let resp = app
        .oneshot(
            Request::post("/upload/chunk")
                .header("x-upload-id", &upload_id)
                .header("x-file-offset", "0")
                .body(Body::from(vec![0u8; 32]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn resent_chunk_at_same_offset_is_idempotent() {
    let (state, _dir) = test_state(0).await;
    let app = build_router(state);

    let init_body = serde_json::json!({
        "filename": "resume.bin",
        "lifetime": 0u64,
        "isEncrypted": false,
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/upload/init")
                .header("content-type", "application/json")
                .body(Body::from(init_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let upload_id = parsed["uploadId"].as_str().unwrap().to_string();

    let chunk = vec![7u8; 1024];
    for _ in 0..3 {
        let resp = app
            .clone()
            .oneshot(
                Request::post("/upload/chunk")
                    .header("x-upload-id", &upload_id)
                    .header("x-file-offset", "0")
                    .body(Body::from(chunk.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let complete_body = serde_json::json!({ "uploadId": upload_id });
    let resp = app
        .oneshot(
            Request::post("/upload/complete")
                .header("content-type", "application/json")
                .body(Body::from(complete_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(parsed["id"].as_str().is_some());
}
