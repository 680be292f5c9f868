//! HTTP wire DTOs for the hosted transfer path (spec §6).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub version: String,
    #[serde(rename = "sizeLimit")]
    pub size_limit_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoResponse {
    pub name: String,
    pub version: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub upload: UploadCapabilities,
    pub p2p: P2pCapabilities,
    #[serde(rename = "webUI")]
    pub web_ui: WebUiCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCapabilities {
    pub enabled: bool,
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: u64,
    #[serde(rename = "maxLifetimeHours")]
    pub max_lifetime_hours: u64,
    pub e2ee: bool,
    #[serde(rename = "chunkSize", skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pCapabilities {
    pub enabled: bool,
    #[serde(rename = "peerjsPath")]
    pub peerjs_path: String,
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebUiCapabilities {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitUploadRequest {
    pub filename: String,
    /// Lifetime in milliseconds; 0 = server default/unlimited.
    pub lifetime: u64,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitUploadResponse {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteUploadRequest {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetaResponse {
    #[serde(rename = "encryptedFilename")]
    pub encrypted_filename: String,
}
