use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use dropgate_types::FileRecord;
use rusqlite::Connection;
use tracing::info;

use crate::FileIndex;

const READER_POOL_SIZE: usize = 4;

/// Persistent, SQLite-backed file index — records and the files they
/// describe survive restarts. Same reader/writer-pool discipline as the
/// in-memory backend's single-lock rule, just spread across a small pool of
/// read-only connections plus one writer.
pub struct SqliteIndex {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl SqliteIndex {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        run_migrations(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "File index opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    fn with_reader<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow::anyhow!("reader lock poisoned: {e}"))?;
        Ok(f(&conn)?)
    }

    fn with_writer<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("writer lock poisoned: {e}"))?;
        Ok(f(&conn)?)
    }
}

fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("File index: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE files (
                file_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                expires_at INTEGER,
                is_encrypted INTEGER NOT NULL,
                size INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        file_id: row.get(0)?,
        name: row.get(1)?,
        storage_path: std::path::PathBuf::from(row.get::<_, String>(2)?),
        expires_at: row.get(3)?,
        is_encrypted: row.get::<_, i64>(4)? != 0,
        size: row.get::<_, i64>(5)? as u64,
    })
}

impl FileIndex for SqliteIndex {
    fn insert(&self, record: FileRecord) -> anyhow::Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO files (file_id, name, storage_path, expires_at, is_encrypted, size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.file_id,
                    record.name,
                    record.storage_path.to_string_lossy(),
                    record.expires_at,
                    record.is_encrypted as i64,
                    record.size as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get(&self, file_id: &str) -> anyhow::Result<Option<FileRecord>> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT file_id, name, storage_path, expires_at, is_encrypted, size
                 FROM files WHERE file_id = ?1",
                [file_id],
                row_to_record,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    fn remove(&self, file_id: &str) -> anyhow::Result<Option<FileRecord>> {
        let existing = self.get(file_id)?;
        if existing.is_some() {
            self.with_writer(|conn| {
                conn.execute("DELETE FROM files WHERE file_id = ?1", [file_id])?;
                Ok(())
            })?;
        }
        Ok(existing)
    }

    fn list_expired(&self, now_ms: i64) -> anyhow::Result<Vec<FileRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT file_id, name, storage_path, expires_at, is_encrypted, size
                 FROM files WHERE expires_at IS NOT NULL AND expires_at < ?1",
            )?;
            let rows = stmt.query_map([now_ms], row_to_record)?;
            rows.collect()
        })
    }
}
