/// The file index (spec §3, §4.4): a map from `fileId` to `FileRecord`,
/// backed either by an in-memory table (default, discarded on restart) or a
/// persistent SQLite-backed one.
///
/// The persistence *mechanism* is explicitly out of scope per spec §1 ("the
/// persistence choice for the file index... treated as an opaque key-value
/// store") — `FileIndex` is the contract that matters; see DESIGN.md for why
/// this rewrite backs the persistent mode with SQLite rather than a flat
/// JSON file.
pub mod memory;
pub mod sqlite;
pub mod sweeps;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use dropgate_types::FileRecord;

/// A mapping from `fileId` to `FileRecord`, safe under concurrent
/// insert/get/remove from request handlers and background sweeps alike
/// (spec §5: "the simplest correct discipline is a single lock around the
/// mapping plus lock-free filesystem operations").
pub trait FileIndex: Send + Sync {
    fn insert(&self, record: FileRecord) -> anyhow::Result<()>;
    fn get(&self, file_id: &str) -> anyhow::Result<Option<FileRecord>>;
    /// Remove and return the record, if any. Used by first-download deletion
    /// and both sweeps.
    fn remove(&self, file_id: &str) -> anyhow::Result<Option<FileRecord>>;
    /// Records whose `expires_at` is before `now_ms`. Records with no
    /// expiry ("never") are never returned.
    fn list_expired(&self, now_ms: i64) -> anyhow::Result<Vec<FileRecord>>;
}
