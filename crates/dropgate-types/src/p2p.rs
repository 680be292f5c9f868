//! The Direct Transfer Engine's wire messages (spec §3, §4.6).
//!
//! These are the JSON control frames exchanged over the reliable datagram
//! channel; `chunk` headers are always immediately followed by one binary
//! frame of exactly `size` bytes carried out-of-band from this enum.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t")]
pub enum P2pMessage {
    #[serde(rename = "hello")]
    Hello {
        #[serde(rename = "protocolVersion")]
        protocol_version: u32,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "meta")]
    Meta {
        #[serde(rename = "sessionId")]
        session_id: String,
        name: String,
        size: u64,
        mime: String,
    },
    #[serde(rename = "ready")]
    Ready {},
    #[serde(rename = "chunk")]
    Chunk { seq: u32, offset: u64, size: u32, total: u64 },
    #[serde(rename = "chunk_ack")]
    ChunkAck { seq: u32, received: u64 },
    #[serde(rename = "end")]
    End { attempt: u32 },
    #[serde(rename = "end_ack")]
    EndAck { received: u64, total: u64 },
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },
    #[serde(rename = "pong")]
    Pong {},
    /// v1-compatibility fallback progress report; not used when the peer
    /// speaks protocol v2 and sends `chunk_ack`.
    #[serde(rename = "progress")]
    Progress { received: u64, total: u64 },
    #[serde(rename = "cancelled")]
    Cancelled { reason: String },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Current protocol version this engine speaks.
pub const PROTOCOL_VERSION: u32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrips_through_json() {
        let msg = P2pMessage::Hello {
            protocol_version: 2,
            session_id: "abc-123".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"t\":\"hello\""));
        assert!(json.contains("\"protocolVersion\":2"));
        let back: P2pMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn chunk_header_roundtrips() {
        let msg = P2pMessage::Chunk { seq: 3, offset: 786432, size: 262144, total: 4194304 };
        let json = serde_json::to_string(&msg).unwrap();
        let back: P2pMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
