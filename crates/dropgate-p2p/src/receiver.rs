/// The receiving half of the Direct Transfer Engine (spec.md §4.6).
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dropgate_types::{DropgateError, P2pMessage, Result, PROTOCOL_VERSION};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use crate::channel::{ChannelEvent, DataChannel};
use crate::config::TransferConfig;
use crate::fsm::{ReceiverState, receiver_transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelledBy {
    Us,
    Peer,
}

#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    Meta { name: String, mime: String, size: u64 },
    Progress { received: u64, total: u64 },
    Completed,
    Cancelled { cancelled_by: CancelledBy },
    Error(String),
}

pub struct ReceivedFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

pub struct ReceiverHandle {
    cancel_tx: mpsc::UnboundedSender<()>,
}

impl ReceiverHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(());
    }
}

pub fn receiver_handle_pair() -> (ReceiverHandle, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReceiverHandle { cancel_tx: tx }, rx)
}

/// Runs the receiver side to completion (or cancellation). On success,
/// returns the assembled file; the final `ReceiverState` tells the caller
/// which outcome occurred regardless of whether the file is `Some`.
pub async fn run_receiver(
    channel: Arc<dyn DataChannel>,
    config: TransferConfig,
    mut cancel_rx: mpsc::UnboundedReceiver<()>,
    mut on_event: impl FnMut(ReceiverEvent),
) -> (ReceiverState, Option<ReceivedFile>) {
    let mut state = ReceiverState::Initializing;
    state = receiver_transition(state, ReceiverState::Connecting);

    macro_rules! cancel_and_return {
        ($by:expr) => {{
            state = receiver_transition(state, ReceiverState::Cancelled);
            state = receiver_transition(state, ReceiverState::Closed);
            channel.close().await;
            on_event(ReceiverEvent::Cancelled { cancelled_by: $by });
            return (state, None);
        }};
    }

    macro_rules! error_and_return {
        ($msg:expr) => {{
            channel.close().await;
            on_event(ReceiverEvent::Error($msg));
            return (state, None);
        }};
    }

    match await_control(&channel, &mut cancel_rx, config.handshake_timeout).await {
        Ok(ControlOrCancel::Control(P2pMessage::Hello { session_id, .. })) => {
            if let Err(e) = channel
                .send_control(P2pMessage::Hello { protocol_version: PROTOCOL_VERSION, session_id })
                .await
            {
                error_and_return!(e.to_string());
            }
        }
        Ok(ControlOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(ControlOrCancel::Closed) => {
            cancel_and_return!(CancelledBy::Peer)
        }
        Ok(ControlOrCancel::Cancel) => cancel_and_return!(CancelledBy::Us),
        Ok(ControlOrCancel::Control(other)) => error_and_return!(format!("unexpected message during handshake: {other:?}")),
        Err(e) => error_and_return!(e.to_string()),
    }

    state = receiver_transition(state, ReceiverState::Negotiating);
    let (name, mime, total_size) = match await_control(&channel, &mut cancel_rx, config.handshake_timeout).await {
        Ok(ControlOrCancel::Control(P2pMessage::Meta { name, mime, size, .. })) => (name, mime, size),
        Ok(ControlOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(ControlOrCancel::Closed) => {
            cancel_and_return!(CancelledBy::Peer)
        }
        Ok(ControlOrCancel::Cancel) => cancel_and_return!(CancelledBy::Us),
        Ok(ControlOrCancel::Control(other)) => error_and_return!(format!("unexpected message during negotiation: {other:?}")),
        Err(e) => error_and_return!(e.to_string()),
    };
    on_event(ReceiverEvent::Meta { name: name.clone(), mime: mime.clone(), size: total_size });
    if let Err(e) = channel.send_control(P2pMessage::Ready {}).await {
        error_and_return!(e.to_string());
    }

    state = receiver_transition(state, ReceiverState::Transferring);
    let mut buffer = BytesMut::with_capacity(total_size as usize);
    let mut pending_chunk: Option<(u32, u64, u32)> = None;

    loop {
        if cancel_rx.try_recv().is_ok() {
            let _ = channel.send_control(P2pMessage::Cancelled { reason: "receiver".to_string() }).await;
            cancel_and_return!(CancelledBy::Us);
        }

        match await_event(&channel, &mut cancel_rx, config.watchdog_timeout).await {
            Ok(EventOrCancel::Control(P2pMessage::Chunk { seq, offset, size, total })) => {
                if total != total_size {
                    error_and_return!(format!("chunk total {total} does not match meta size {total_size}"));
                }
                pending_chunk = Some((seq, offset, size));
            }
            Ok(EventOrCancel::Binary(data)) => {
                let Some((seq, offset, expected_size)) = pending_chunk.take() else {
                    error_and_return!("binary frame with no preceding chunk header".to_string());
                };
                if data.len() as u32 != expected_size {
                    error_and_return!(format!("chunk {seq} size mismatch: expected {expected_size}, got {}", data.len()));
                }
                if offset as usize != buffer.len() {
                    error_and_return!(format!("out-of-order chunk {seq}: expected offset {}, got {offset}", buffer.len()));
                }
                buffer.extend_from_slice(&data);
                on_event(ReceiverEvent::Progress { received: buffer.len() as u64, total: total_size });
                if let Err(e) = channel
                    .send_control(P2pMessage::ChunkAck { seq, received: buffer.len() as u64 })
                    .await
                {
                    error_and_return!(e.to_string());
                }
            }
            Ok(EventOrCancel::Control(P2pMessage::End { .. })) => {
                if let Err(e) = channel
                    .send_control(P2pMessage::EndAck { received: buffer.len() as u64, total: total_size })
                    .await
                {
                    error_and_return!(e.to_string());
                }
                break;
            }
            Ok(EventOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(EventOrCancel::Closed) => {
                cancel_and_return!(CancelledBy::Peer)
            }
            Ok(EventOrCancel::Cancel) => {
                let _ = channel.send_control(P2pMessage::Cancelled { reason: "receiver".to_string() }).await;
                cancel_and_return!(CancelledBy::Us)
            }
            Ok(EventOrCancel::Control(P2pMessage::Ping { .. })) => {
                if let Err(e) = channel.send_control(P2pMessage::Pong {}).await {
                    error_and_return!(e.to_string());
                }
            }
            Ok(EventOrCancel::Control(other)) => {
                debug!("ignoring unexpected control message mid-transfer: {other:?}");
            }
            Err(e) => error_and_return!(e.to_string()),
        }
    }

    state = receiver_transition(state, ReceiverState::Completed);
    state = receiver_transition(state, ReceiverState::Closed);
    channel.close().await;
    on_event(ReceiverEvent::Completed);
    (
        state,
        Some(ReceivedFile { name, mime, data: buffer.freeze() }),
    )
}

enum ControlOrCancel {
    Control(P2pMessage),
    Closed,
    Cancel,
}

enum EventOrCancel {
    Control(P2pMessage),
    Binary(Bytes),
    Closed,
    Cancel,
}

async fn await_control(
    channel: &Arc<dyn DataChannel>,
    cancel_rx: &mut mpsc::UnboundedReceiver<()>,
    wait: std::time::Duration,
) -> Result<ControlOrCancel> {
    tokio::select! {
        _ = cancel_rx.recv() => Ok(ControlOrCancel::Cancel),
        result = timeout(wait, channel.recv()) => {
            match result {
                Ok(Ok(ChannelEvent::Control(msg))) => Ok(ControlOrCancel::Control(msg)),
                Ok(Ok(ChannelEvent::Binary(_))) => Err(DropgateError::protocol("unexpected binary frame waiting for control message")),
                Ok(Ok(ChannelEvent::Closed)) => Ok(ControlOrCancel::Closed),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(DropgateError::timeout("peer did not respond in time")),
            }
        }
    }
}

async fn await_event(
    channel: &Arc<dyn DataChannel>,
    cancel_rx: &mut mpsc::UnboundedReceiver<()>,
    wait: std::time::Duration,
) -> Result<EventOrCancel> {
    tokio::select! {
        _ = cancel_rx.recv() => Ok(EventOrCancel::Cancel),
        result = timeout(wait, channel.recv()) => {
            match result {
                Ok(Ok(ChannelEvent::Control(msg))) => Ok(EventOrCancel::Control(msg)),
                Ok(Ok(ChannelEvent::Binary(data))) => Ok(EventOrCancel::Binary(data)),
                Ok(Ok(ChannelEvent::Closed)) => Ok(EventOrCancel::Closed),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(DropgateError::timeout("peer did not send the next chunk in time")),
            }
        }
    }
}
