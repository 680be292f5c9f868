pub mod api;
pub mod error;
pub mod models;
pub mod p2p;

pub use error::{DropgateError, Result};
pub use models::{FileRecord, UploadSession};
pub use p2p::{P2pMessage, PROTOCOL_VERSION};
