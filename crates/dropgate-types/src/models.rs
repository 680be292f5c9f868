use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An entry in the server-side file index (spec §3).
///
/// Invariants: `file_id` is unique; a record exists iff the file at
/// `storage_path` exists; if `is_encrypted` then the server must have E2EE
/// enabled; `size` is always `> 0` (0-byte uploads are rejected at
/// `complete`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    /// Plain filename, or base64 ciphertext when `is_encrypted`.
    pub name: String,
    pub storage_path: PathBuf,
    /// Absolute wall-clock millisecond timestamp, or `None` for "never".
    pub expires_at: Option<i64>,
    pub is_encrypted: bool,
    pub size: u64,
}

/// An in-progress upload, tracked server-side until `complete` or reclaimed
/// by the zombie sweep.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub temp_path: PathBuf,
    pub declared_name: String,
    /// 0 means "server default / unlimited".
    pub declared_lifetime_ms: u64,
    pub declared_encrypted: bool,
}
