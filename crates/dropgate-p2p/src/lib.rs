//! The Direct Transfer Engine (spec.md §4.6): two finite-state machines,
//! `sender` and `receiver`, exchanging `dropgate_types::P2pMessage` control
//! frames and raw binary chunks over an injected `DataChannel`. Nothing in
//! this crate knows about WebRTC or sockets — `channel::LoopbackChannel` and
//! `channel::LoopbackBroker` stand in for a real transport in tests, and a
//! desktop shell wires a real one in at the edges.
pub mod channel;
pub mod config;
pub mod fsm;
pub mod receiver;
pub mod rendezvous;
pub mod sender;

pub use channel::{ChannelEvent, DataChannel, LoopbackBroker, LoopbackChannel, SignallingBroker, loopback_pair};
pub use config::TransferConfig;
pub use fsm::{ReceiverState, SenderState};
pub use receiver::{ReceivedFile, ReceiverEvent, ReceiverHandle, receiver_handle_pair, run_receiver};
pub use sender::{SenderEvent, SenderHandle, sender_handle_pair, run_sender};

/// Generates a fresh session id for a transfer's `hello`/`meta` frames.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
