use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::FileIndex;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Background task that prunes expired files (spec §4.4): on each tick, pulls
/// every record whose `expiresAt` has passed, deletes its blob from disk, and
/// drops it from the index. Records with no expiry are never touched.
pub async fn run_ttl_sweep(index: Arc<dyn FileIndex>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep_expired(&index).await {
            Ok(count) => {
                if count > 0 {
                    info!("TTL sweep: pruned {} expired file(s)", count);
                }
            }
            Err(e) => warn!("TTL sweep error: {}", e),
        }
    }
}

async fn sweep_expired(index: &Arc<dyn FileIndex>) -> anyhow::Result<usize> {
    let expired = index.list_expired(now_ms())?;
    let count = expired.len();

    for record in expired {
        if let Err(e) = tokio::fs::remove_file(&record.storage_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "TTL sweep: failed to remove blob for {}: {}",
                    record.file_id, e
                );
            }
        }
        index.remove(&record.file_id)?;
    }

    Ok(count)
}

/// Background task that prunes zombie upload temp files (spec §3, §4.4, §8):
/// a zombie is a temp file with no owning session — the upload's client
/// vanished mid-transfer and left a half-written file behind. `live_sessions`
/// is polled fresh on every tick (not captured once) so a slow but live
/// upload is never unlinked out from under it just because its temp file
/// aged past `max_age_secs`.
pub async fn run_zombie_sweep<F>(temp_dir: PathBuf, max_age_secs: u64, interval_secs: u64, live_sessions: F)
where
    F: Fn() -> HashSet<String> + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep_zombies(&temp_dir, max_age_secs, &live_sessions()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Zombie sweep: removed {} stale temp file(s)", count);
                }
            }
            Err(e) => warn!("Zombie sweep error: {}", e),
        }
    }
}

async fn sweep_zombies(temp_dir: &PathBuf, max_age_secs: u64, live_sessions: &HashSet<String>) -> anyhow::Result<usize> {
    let mut entries = match tokio::fs::read_dir(temp_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let max_age = Duration::from_secs(max_age_secs);
    let mut count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let Some(upload_id) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if live_sessions.contains(&upload_id) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or_default();

        if age > max_age {
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                count += 1;
            }
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryIndex;
    use dropgate_types::FileRecord;
    use std::path::PathBuf;

    #[tokio::test]
    async fn ttl_sweep_removes_only_expired_records() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("expired.bin");
        tokio::fs::write(&blob_path, b"stale").await.unwrap();

        let index: Arc<dyn FileIndex> = Arc::new(MemoryIndex::new());
        index
            .insert(FileRecord {
                file_id: "expired".into(),
                name: "expired.bin".into(),
                storage_path: blob_path.clone(),
                expires_at: Some(0),
                is_encrypted: false,
                size: 5,
            })
            .unwrap();
        index
            .insert(FileRecord {
                file_id: "forever".into(),
                name: "forever.bin".into(),
                storage_path: PathBuf::from("/does/not/matter"),
                expires_at: None,
                is_encrypted: false,
                size: 5,
            })
            .unwrap();

        let removed = sweep_expired(&index).await.unwrap();
        assert_eq!(removed, 1);
        assert!(index.get("expired").unwrap().is_none());
        assert!(index.get("forever").unwrap().is_some());
        assert!(!blob_path.exists());
    }

    #[tokio::test]
    async fn zombie_sweep_only_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("stale.part");
        let fresh = dir.path().join("fresh.part");
        tokio::fs::write(&stale, b"old").await.unwrap();
        tokio::fs::write(&fresh, b"new").await.unwrap();

        // Backdate the stale file's mtime well past the threshold.
        let old_time = SystemTime::now() - Duration::from_secs(3600);
        filetime_touch(&stale, old_time);

        let removed = sweep_zombies(&dir.path().to_path_buf(), 60, &HashSet::new()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn zombie_sweep_spares_stale_files_with_a_live_session() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("upload-123");
        tokio::fs::write(&stale, b"still uploading").await.unwrap();
        filetime_touch(&stale, SystemTime::now() - Duration::from_secs(3600));

        let live: HashSet<String> = [String::from("upload-123")].into_iter().collect();
        let removed = sweep_zombies(&dir.path().to_path_buf(), 60, &live).await.unwrap();
        assert_eq!(removed, 0);
        assert!(stale.exists());
    }

    fn filetime_touch(path: &std::path::Path, time: SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }
}
