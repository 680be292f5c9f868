use std::time::Duration;

use dropgate_crypto::envelope;
use dropgate_types::api::{FileMetaResponse, ServerInfoResponse};
use dropgate_types::{DropgateError, Result};
use futures_util::StreamExt;
use tracing::info;

use crate::retry::classify_status;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
/// Below this, a caller may choose to buffer the whole download into memory
/// instead of streaming to disk (spec.md §4.5).
pub const IN_MEMORY_SAFETY_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Phases reported to the caller (spec.md §4.5): plain downloads skip
/// `Metadata`/`Decrypting`.
#[derive(Debug, Clone)]
pub enum DownloadPhase {
    ServerInfo,
    ServerCompat,
    Metadata,
    Downloading,
    Decrypting,
    Complete,
}

pub struct DownloadOutcome {
    pub name: String,
}

pub struct DownloadSession {
    client: reqwest::Client,
    base_url: String,
}

impl DownloadSession {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Plain sub-protocol: GET `{fileId}`, stream bytes to `on_data`.
    pub async fn download_plain(
        &self,
        file_id: &str,
        mut on_phase: impl FnMut(DownloadPhase),
        mut on_data: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<DownloadOutcome> {
        on_phase(DownloadPhase::ServerInfo);
        let info = self.fetch_server_info().await?;
        on_phase(DownloadPhase::ServerCompat);
        check_compat(&info.version, CLIENT_VERSION)?;

        on_phase(DownloadPhase::Downloading);
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, file_id))
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("download request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "download"));
        }

        let name = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_filename_from_disposition)
            .unwrap_or_else(|| file_id.to_string());

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DropgateError::network(format!("stream error: {e}")))?;
            on_data(&chunk)?;
        }

        on_phase(DownloadPhase::Complete);
        info!("Plain download complete: {}", file_id);
        Ok(DownloadOutcome { name })
    }

    /// Encrypted sub-protocol: fetch the encrypted filename, then stream and
    /// decrypt the body chunk-by-chunk (spec.md §4.5 — each chunk is an
    /// independent `IV || ct || tag` envelope, concatenated by the sender).
    pub async fn download_encrypted(
        &self,
        file_id: &str,
        key: &[u8; 32],
        mut on_phase: impl FnMut(DownloadPhase),
        mut on_data: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<DownloadOutcome> {
        on_phase(DownloadPhase::ServerInfo);
        let info = self.fetch_server_info().await?;
        on_phase(DownloadPhase::ServerCompat);
        check_compat(&info.version, CLIENT_VERSION)?;

        on_phase(DownloadPhase::Metadata);
        let meta = self.fetch_meta(file_id).await?;
        let name = envelope::decrypt_filename(&meta.encrypted_filename, key)?;

        on_phase(DownloadPhase::Downloading);
        let resp = self
            .client
            .get(format!("{}/api/file/{}", self.base_url, file_id))
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("download request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "download"));
        }

        let chunk_size = info.capabilities.upload.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let envelope_size = (chunk_size + 28) as usize;

        on_phase(DownloadPhase::Decrypting);
        let mut buf: Vec<u8> = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DropgateError::network(format!("stream error: {e}")))?;
            buf.extend_from_slice(&chunk);
            while buf.len() >= envelope_size {
                let envelope_bytes: Vec<u8> = buf.drain(..envelope_size).collect();
                let plaintext = envelope::decrypt(&envelope_bytes, key)?;
                on_data(&plaintext)?;
            }
        }
        if !buf.is_empty() {
            let plaintext = envelope::decrypt(&buf, key)?;
            on_data(&plaintext)?;
        }

        on_phase(DownloadPhase::Complete);
        info!("Encrypted download complete: {}", file_id);
        Ok(DownloadOutcome { name })
    }

    async fn fetch_server_info(&self) -> Result<ServerInfoResponse> {
        let resp = self
            .client
            .get(format!("{}/api/info", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("server-info request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "server-info"));
        }
        resp.json()
            .await
            .map_err(|e| DropgateError::protocol(format!("malformed server-info response: {e}")))
    }

    async fn fetch_meta(&self, file_id: &str) -> Result<FileMetaResponse> {
        let resp = self
            .client
            .get(format!("{}/api/file/{}/meta", self.base_url, file_id))
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("meta request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "meta"));
        }
        resp.json()
            .await
            .map_err(|e| DropgateError::protocol(format!("malformed meta response: {e}")))
    }
}

fn check_compat(server_version: &str, client_version: &str) -> Result<()> {
    let server_mm = major_minor(server_version);
    let client_mm = major_minor(client_version);
    if server_mm != client_mm {
        return Err(DropgateError::protocol(format!(
            "incompatible server version: server={server_version} client={client_version}"
        )));
    }
    Ok(())
}

fn major_minor(version: &str) -> (u32, u32) {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (major, minor)
}

fn parse_filename_from_disposition(value: &str) -> Option<String> {
    let marker = "filename=\"";
    let start = value.find(marker)? + marker.len();
    let rest = &value[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filename_out_of_content_disposition() {
        let value = "attachment; filename=\"report.pdf\"";
        assert_eq!(parse_filename_from_disposition(value).as_deref(), Some("report.pdf"));
    }

    #[test]
    fn missing_filename_returns_none() {
        assert!(parse_filename_from_disposition("attachment").is_none());
    }
}
