use dropgate_types::Result;

/// Capability trait abstracting over where the bytes to upload actually live
/// (spec.md §9's design note: browser `Blob`, Node stream, or a plain
/// desktop file should all chunk the same way). Decoupling the upload
/// session from the filesystem makes the chunking/retry logic testable with
/// an in-memory fixture.
pub trait FileSource: Send + Sync {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn mime(&self) -> &str;
    /// Read `[start, end)` into memory. `end` may exceed `size()`, callers
    /// clamp first.
    fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>>;
    /// Read the whole source into memory — used by the download side's
    /// in-memory sink and by small test fixtures.
    fn bytes(&self) -> Result<Vec<u8>> {
        self.slice(0, self.size())
    }
}

/// A plain file on disk.
pub struct FsFileSource {
    name: String,
    mime: String,
    path: std::path::PathBuf,
    size: u64,
}

impl FsFileSource {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)
            .map_err(|e| dropgate_types::DropgateError::validation(format!("cannot stat file: {e}")))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        Ok(Self {
            name,
            mime: "application/octet-stream".to_string(),
            path,
            size: metadata.len(),
        })
    }
}

impl FileSource for FsFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime(&self) -> &str {
        &self.mime
    }

    fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let end = end.min(self.size);
        if start >= end {
            return Ok(Vec::new());
        }
        let mut file = std::fs::File::open(&self.path)
            .map_err(|e| dropgate_types::DropgateError::network(format!("cannot open file: {e}")))?;
        file.seek(SeekFrom::Start(start))
            .map_err(|e| dropgate_types::DropgateError::network(format!("seek failed: {e}")))?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf)
            .map_err(|e| dropgate_types::DropgateError::network(format!("read failed: {e}")))?;
        Ok(buf)
    }
}

/// In-memory fixture, used by tests and by callers that already hold the
/// full buffer (e.g. clipboard/paste flows).
pub struct MemoryFileSource {
    name: String,
    mime: String,
    data: Vec<u8>,
}

impl MemoryFileSource {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }
}

impl FileSource for MemoryFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime(&self) -> &str {
        &self.mime
    }

    fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let start = start.min(self.data.len() as u64) as usize;
        let end = end.min(self.data.len() as u64) as usize;
        Ok(self.data[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_slices_clamp_to_bounds() {
        let src = MemoryFileSource::new("a.bin", "application/octet-stream", vec![1, 2, 3, 4, 5]);
        assert_eq!(src.slice(1, 3).unwrap(), vec![2, 3]);
        assert_eq!(src.slice(3, 100).unwrap(), vec![4, 5]);
        assert_eq!(src.bytes().unwrap(), vec![1, 2, 3, 4, 5]);
    }
}
