use std::time::Duration;

use dropgate_crypto::{envelope, keys};
use dropgate_types::api::{CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest, InitUploadResponse, ServerInfoResponse};
use dropgate_types::{DropgateError, Result};
use tracing::{debug, info};

use crate::retry::{classify_status, retry_with_backoff, RetryPolicy, RetrySignal};
use crate::source::FileSource;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Phases reported to the caller (spec.md §4.2): `server-info →
/// server-compat → crypto → init → chunk(i/n) → complete → done`, with
/// `retry-wait → retry` interleaved during a chunk's backoff.
#[derive(Debug, Clone)]
pub enum UploadPhase {
    ServerInfo,
    ServerCompat,
    Crypto,
    Init,
    Chunk { index: usize, total: usize },
    Complete,
    Done,
    RetryWait { attempt: u32 },
    Retry { attempt: u32 },
}

pub struct UploadOutcome {
    pub file_id: String,
    pub share_url: String,
}

/// Owns one logical upload attempt end to end (spec.md §4.2).
pub struct UploadSession {
    client: reqwest::Client,
    base_url: String,
}

impl UploadSession {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn upload(
        &self,
        source: &dyn FileSource,
        lifetime_ms: u64,
        encrypt: bool,
        mut on_phase: impl FnMut(UploadPhase),
    ) -> Result<UploadOutcome> {
        on_phase(UploadPhase::ServerInfo);
        let info = self.fetch_server_info().await?;

        if !info.capabilities.upload.enabled {
            return Err(DropgateError::protocol("hosted upload is disabled on this server"));
        }
        if info.capabilities.upload.max_size_mb > 0
            && source.size() > info.capabilities.upload.max_size_mb * 1024 * 1024
        {
            return Err(DropgateError::validation("file exceeds the server's max size"));
        }
        let lifetime_hours = lifetime_ms / 3_600_000;
        if info.capabilities.upload.max_lifetime_hours > 0
            && lifetime_hours > info.capabilities.upload.max_lifetime_hours
        {
            return Err(DropgateError::validation("lifetime exceeds the server's max lifetime"));
        }
        if encrypt && !info.capabilities.upload.e2ee {
            return Err(DropgateError::validation("server does not support encryption"));
        }

        on_phase(UploadPhase::ServerCompat);
        check_compat(&info.version, CLIENT_VERSION)?;

        on_phase(UploadPhase::Crypto);
        let key = if encrypt { Some(keys::generate_key()) } else { None };
        let wire_name = match &key {
            Some(k) => envelope::encrypt_filename(source.name(), k),
            None => source.name().to_string(),
        };

        on_phase(UploadPhase::Init);
        let upload_id = self.init_upload(&wire_name, lifetime_ms, encrypt).await?;

        let chunk_size = info
            .capabilities
            .upload
            .chunk_size
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let total_chunks = if source.size() == 0 {
            1
        } else {
            source.size().div_ceil(chunk_size) as usize
        };

        // `plain_offset` walks the source in cleartext chunk-size strides;
        // `wire_offset` walks the assembled (possibly encrypted) file on the
        // server, which advances by each chunk's post-encryption length.
        let mut plain_offset: u64 = 0;
        let mut wire_offset: u64 = 0;
        for i in 0..total_chunks {
            on_phase(UploadPhase::Chunk { index: i, total: total_chunks });
            let end = (plain_offset + chunk_size).min(source.size());
            let plaintext = source.slice(plain_offset, end)?;
            let payload = match &key {
                Some(k) => envelope::encrypt(&plaintext, k),
                None => plaintext,
            };
            let payload_len = payload.len() as u64;

            let upload_id = upload_id.clone();
            let this_wire_offset = wire_offset;
            let policy = RetryPolicy::default();
            retry_with_backoff(
                policy,
                |signal| match signal {
                    RetrySignal::Waiting { attempt, .. } => on_phase(UploadPhase::RetryWait { attempt }),
                    RetrySignal::Retrying { attempt } => on_phase(UploadPhase::Retry { attempt }),
                },
                || self.post_chunk(&upload_id, this_wire_offset, payload.clone()),
            )
            .await?;

            plain_offset = end;
            wire_offset += payload_len;
        }

        on_phase(UploadPhase::Complete);
        let file_id = self.complete_upload(&upload_id).await?;

        let mut share_url = format!("{}/{}", self.base_url.trim_end_matches('/'), file_id);
        if let Some(k) = &key {
            share_url.push('#');
            share_url.push_str(&keys::key_to_base64(k));
        }

        on_phase(UploadPhase::Done);
        info!("Upload complete: {}", file_id);
        Ok(UploadOutcome { file_id, share_url })
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

    async fn init_upload(&self, filename: &str, lifetime_ms: u64, is_encrypted: bool) -> Result<String> {
        let req = InitUploadRequest {
            filename: filename.to_string(),
            lifetime: lifetime_ms,
            is_encrypted,
        };
        let resp = self
            .client
            .post(format!("{}/upload/init", self.base_url))
            .timeout(Duration::from_secs(15))
            .json(&req)
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("init request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "init"));
        }
        let body: InitUploadResponse = resp
            .json()
            .await
            .map_err(|e| DropgateError::protocol(format!("malformed init response: {e}")))?;
        Ok(body.upload_id)
    }

    async fn post_chunk(&self, upload_id: &str, offset: u64, payload: Vec<u8>) -> Result<()> {
        debug!("POST chunk upload_id={} offset={} len={}", upload_id, offset, payload.len());
        let resp = self
            .client
            .post(format!("{}/upload/chunk", self.base_url))
            .timeout(Duration::from_secs(60))
            .header("X-Upload-Id", upload_id)
            .header("X-File-Offset", offset.to_string())
            .body(payload)
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("chunk request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "chunk"));
        }
        Ok(())
    }

    async fn complete_upload(&self, upload_id: &str) -> Result<String> {
        let req = CompleteUploadRequest { upload_id: upload_id.to_string() };
        let resp = self
            .client
            .post(format!("{}/upload/complete", self.base_url))
            .timeout(Duration::from_secs(30))
            .json(&req)
            .send()
            .await
            .map_err(|e| DropgateError::network(format!("complete request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16(), "complete"));
        }
        let body: CompleteUploadResponse = resp
            .json()
            .await
            .map_err(|e| DropgateError::protocol(format!("malformed complete response: {e}")))?;
        Ok(body.id)
    }
}

/// Compares `major.minor` only (spec.md §4.2 point 2); patch differences are
/// compatible.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compat_check_ignores_patch_version() {
        assert!(check_compat("1.0.5", "1.0.0").is_ok());
        assert!(check_compat("1.1.0", "1.0.0").is_err());
        assert!(check_compat("2.0.0", "1.0.0").is_err());
    }
}
