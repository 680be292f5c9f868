use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse},
};
use dropgate_index::FileIndex;
use dropgate_types::api::{
    Capabilities, CompleteUploadRequest, CompleteUploadResponse, ErrorResponse, FileMetaResponse,
    InitUploadRequest, InitUploadResponse, P2pCapabilities, RootResponse, ServerInfoResponse,
    UploadCapabilities, WebUiCapabilities,
};
use dropgate_types::{FileRecord, UploadSession};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::storage::Storage;

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<dyn FileIndex>,
    pub storage: Arc<Storage>,
    pub config: Arc<ServerConfig>,
    /// Upload sessions are ephemeral and never persisted — they live only as
    /// long as the client is actively driving init/chunk/complete (spec.md
    /// §3's `UploadSession`).
    pub sessions: Arc<Mutex<HashMap<String, UploadSession>>>,
}

fn err(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// GET / — liveness + size-limit advertisement (spec.md §6).
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok",
        version: state.config.server_version.clone(),
        size_limit_mb: state.config.max_size_mb(),
    })
}

/// GET /health — plain-text liveness probe, ambient addition (see SPEC_FULL.md).
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/info — capability negotiation for C2's server-info phase.
pub async fn info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    let cfg = &state.config;
    Json(ServerInfoResponse {
        name: cfg.server_name.clone(),
        version: cfg.server_version.clone(),
        capabilities: Capabilities {
            upload: UploadCapabilities {
                enabled: true,
                max_size_mb: cfg.max_size_mb(),
                max_lifetime_hours: cfg.max_lifetime_hours,
                e2ee: cfg.enable_e2ee,
                chunk_size: Some(cfg.chunk_size_bytes),
            },
            p2p: P2pCapabilities {
                enabled: true,
                peerjs_path: cfg.peerjs_path.clone(),
                ice_servers: cfg.ice_servers.clone(),
            },
            web_ui: WebUiCapabilities { enabled: false },
        },
    })
}

fn validate_filename(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("filename must not be empty");
    }
    if name.len() > 255 {
        return Err("filename must be at most 255 bytes");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("filename must not contain path separators");
    }
    Ok(())
}

/// POST /upload/init
pub async fn upload_init(
    State(state): State<AppState>,
    Json(req): Json<InitUploadRequest>,
) -> Result<(StatusCode, Json<InitUploadResponse>), (StatusCode, Json<ErrorResponse>)> {
    if req.is_encrypted && !state.config.enable_e2ee {
        return Err(err(StatusCode::BAD_REQUEST, "encryption is disabled on this server"));
    }
    if !req.is_encrypted {
        if let Err(msg) = validate_filename(&req.filename) {
            return Err(err(StatusCode::BAD_REQUEST, msg));
        }
    } else if req.filename.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "encrypted filename must not be empty"));
    }

    let upload_id = Uuid::new_v4().to_string();
    state.storage.create_tempfile(&upload_id).await.map_err(|e| {
        warn!("Failed to create tempfile for {}: {}", upload_id, e);
        err(StatusCode::INTERNAL_SERVER_ERROR, "failed to start upload")
    })?;

    let session = UploadSession {
        upload_id: upload_id.clone(),
        temp_path: state.storage.temp_path(&upload_id),
        declared_name: req.filename,
        declared_lifetime_ms: req.lifetime,
        declared_encrypted: req.is_encrypted,
    };

    state
        .sessions
        .lock()
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "session lock poisoned"))?
        .insert(upload_id.clone(), session);

    info!("Upload {} initialized", upload_id);
    Ok((StatusCode::OK, Json(InitUploadResponse { upload_id })))
}

/// POST /upload/chunk — raw body, offset-addressed write (spec.md §4.3).
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let upload_id = headers
        .get("x-upload-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| err(StatusCode::BAD_REQUEST, "missing X-Upload-Id"))?
        .to_string();
    let offset: u64 = headers
        .get("x-file-offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| err(StatusCode::BAD_REQUEST, "missing or invalid X-File-Offset"))?;

    let exists = {
        let sessions = state
            .sessions
            .lock()
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "session lock poisoned"))?;
        sessions.contains_key(&upload_id)
    };
    if !exists {
        return Err(err(StatusCode::BAD_REQUEST, "unknown uploadId"));
    }

    state
        .storage
        .write_chunk_at(&upload_id, offset, &body)
        .await
        .map_err(|e| {
            warn!("Failed to write chunk for {}: {}", upload_id, e);
            err(StatusCode::INTERNAL_SERVER_ERROR, "write failed")
        })?;

    if state.config.max_file_size_bytes > 0 {
        let size = state.storage.tempfile_size(&upload_id).await.unwrap_or(0);
        if size > state.config.max_file_size_bytes {
            warn!(
                "Upload {} exceeded max size ({} > {})",
                upload_id, size, state.config.max_file_size_bytes
            );
            let _ = state.storage.delete_tempfile(&upload_id).await;
            if let Ok(mut sessions) = state.sessions.lock() {
                sessions.remove(&upload_id);
            }
            return Err(err(StatusCode::PAYLOAD_TOO_LARGE, "file too large"));
        }
    }

    Ok(StatusCode::OK)
}

/// POST /upload/complete
pub async fn upload_complete(
    State(state): State<AppState>,
    Json(req): Json<CompleteUploadRequest>,
) -> Result<Json<CompleteUploadResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session = {
        let mut sessions = state
            .sessions
            .lock()
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "session lock poisoned"))?;
        sessions
            .remove(&req.upload_id)
            .ok_or_else(|| err(StatusCode::BAD_REQUEST, "unknown uploadId"))?
    };

    let declared_size = state
        .storage
        .tempfile_size(&session.upload_id)
        .await
        .unwrap_or(0);
    if declared_size == 0 {
        let _ = state.storage.delete_tempfile(&session.upload_id).await;
        return Err(err(StatusCode::BAD_REQUEST, "uploaded file is empty"));
    }

    let file_id = Uuid::new_v4().to_string();
    let size = state
        .storage
        .finalize(&session.upload_id, &file_id)
        .await
        .map_err(|e| {
            warn!("Failed to finalize upload {}: {}", session.upload_id, e);
            err(StatusCode::INTERNAL_SERVER_ERROR, "failed to finalize upload")
        })?;

    let expires_at = if session.declared_lifetime_ms == 0 {
        None
    } else {
        Some(now_ms() + session.declared_lifetime_ms as i64)
    };

    let record = FileRecord {
        file_id: file_id.clone(),
        name: session.declared_name,
        storage_path: state.storage.file_path(&file_id),
        expires_at,
        is_encrypted: session.declared_encrypted,
        size,
    };
    state
        .index
        .insert(record)
        .map_err(|e| {
            warn!("Failed to insert file record {}: {}", file_id, e);
            err(StatusCode::INTERNAL_SERVER_ERROR, "failed to register file")
        })?;

    info!("Upload {} completed as file {} ({} bytes)", session.upload_id, file_id, size);
    Ok(Json(CompleteUploadResponse { id: file_id }))
}

/// GET /api/file/:fileId/meta — encrypted files only.
pub async fn file_meta(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileMetaResponse>, StatusCode> {
    let record = state
        .index
        .get(&file_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if !record.is_encrypted {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(FileMetaResponse {
        encrypted_filename: record.name,
    }))
}

/// GET /api/file/:fileId — raw encrypted bytes, deleted on drain.
pub async fn file_data(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let record = state
        .index
        .get(&file_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if !record.is_encrypted {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(stream_and_delete(state, record))
}

/// GET /:fileId — browser entry point. Plain files stream raw bytes;
/// encrypted files get a stub decryptor page (the real browser UI is an
/// external collaborator per spec.md §1 — this just fills the routing slot).
pub async fn serve_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<axum::response::Response, StatusCode> {
    let record = state
        .index
        .get(&file_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if record.is_encrypted {
        if !is_https(&headers) {
            return Ok((
                StatusCode::BAD_REQUEST,
                Html("<html><body>This link must be opened over HTTPS.</body></html>"),
            )
                .into_response());
        }
        return Ok((
            StatusCode::OK,
            Html(
                "<html><body>Encrypted file — decryption happens in the browser, \
                 outside this server's scope.</body></html>",
            ),
        )
            .into_response());
    }

    Ok(stream_and_delete(state, record).into_response())
}

fn is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Streams a file's bytes and guarantees deletion of both the blob and its
/// index record once the body is no longer being polled — whether the
/// download drained fully or the client aborted mid-stream (spec.md §4.4's
/// first-download deletion, and Open Question (a) in spec.md §9).
fn stream_and_delete(state: AppState, record: FileRecord) -> axum::response::Response {
    let content_length = record.size;
    let name = if record.is_encrypted {
        "download.bin".to_string()
    } else {
        record.name.clone()
    };
    let path = record.storage_path.clone();
    let file_id = record.file_id.clone();

    let guard = DeleteOnDrop {
        index: state.index.clone(),
        storage: state.storage.clone(),
        file_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        use tokio::io::AsyncReadExt;

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                yield Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                return;
            }
        };
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield Ok(bytes::Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    };

    let body = Body::from_stream(stream);
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "application/octet-stream".parse().unwrap());
    headers.insert(header::CONTENT_LENGTH, content_length.to_string().parse().unwrap());
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", sanitize_header_value(&name))
            .parse()
            .unwrap(),
    );

    (StatusCode::OK, headers, body).into_response()
}

fn sanitize_header_value(name: &str) -> String {
    name.replace(['"', '\r', '\n'], "_")
}

struct DeleteOnDrop {
    index: Arc<dyn FileIndex>,
    storage: Arc<Storage>,
    file_id: String,
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        let index = self.index.clone();
        let storage = self.storage.clone();
        let file_id = self.file_id.clone();
        tokio::spawn(async move {
            match index.remove(&file_id) {
                Ok(Some(_)) => {
                    if let Err(e) = storage.delete_file(&file_id).await {
                        warn!("First-download cleanup failed for {}: {}", file_id, e);
                    } else {
                        info!("File {} deleted after first download", file_id);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Index remove failed for {}: {}", file_id, e),
            }
        });
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
