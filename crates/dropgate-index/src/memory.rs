use std::collections::HashMap;
use std::sync::Mutex;

use dropgate_types::FileRecord;

use crate::FileIndex;

/// In-memory file index, the default backend. Contents are discarded on
/// restart (the server wipes the upload dir and temp dir at startup to
/// match, so there's never a record pointing at a dead file).
pub struct MemoryIndex {
    records: Mutex<HashMap<String, FileRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIndex for MemoryIndex {
    fn insert(&self, record: FileRecord) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
        records.insert(record.file_id.clone(), record);
        Ok(())
    }

    fn get(&self, file_id: &str) -> anyhow::Result<Option<FileRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
        Ok(records.get(file_id).cloned())
    }

    fn remove(&self, file_id: &str) -> anyhow::Result<Option<FileRecord>> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
        Ok(records.remove(file_id))
    }

    fn list_expired(&self, now_ms: i64) -> anyhow::Result<Vec<FileRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
        Ok(records
            .values()
            .filter(|r| r.expires_at.is_some_and(|exp| exp < now_ms))
            .cloned()
            .collect())
    }
}
