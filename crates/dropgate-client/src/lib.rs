pub mod download;
pub mod retry;
pub mod source;
pub mod upload;

pub use download::{DownloadOutcome, DownloadPhase, DownloadSession};
pub use source::{FileSource, FsFileSource, MemoryFileSource};
pub use upload::{UploadOutcome, UploadPhase, UploadSession};
