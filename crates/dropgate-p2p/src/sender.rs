/// The sending half of the Direct Transfer Engine (spec.md §4.6).
use std::sync::Arc;

use bytes::Bytes;
use dropgate_types::{DropgateError, P2pMessage, Result, PROTOCOL_VERSION};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, sleep, timeout, timeout_at};
use tracing::{debug, warn};

use crate::channel::{ChannelEvent, DataChannel};
use crate::config::TransferConfig;
use crate::fsm::{SenderState, sender_transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelledBy {
    Us,
    Peer,
}

#[derive(Debug, Clone)]
pub enum SenderEvent {
    Progress { sent: u64, total: u64 },
    Completed,
    Cancelled { cancelled_by: CancelledBy },
    Error(String),
}

/// A handle the caller can use to request cancellation mid-transfer.
pub struct SenderHandle {
    cancel_tx: mpsc::UnboundedSender<()>,
}

impl SenderHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(());
    }
}

pub fn sender_handle_pair() -> (SenderHandle, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SenderHandle { cancel_tx: tx }, rx)
}

/// Runs the sender side to completion (or cancellation), emitting events
/// through `on_event`. Returns the final `SenderState`; callers should treat
/// anything other than `Completed`/`Closed` as a failed transfer.
pub async fn run_sender(
    channel: Arc<dyn DataChannel>,
    session_id: String,
    name: String,
    mime: String,
    data: Bytes,
    config: TransferConfig,
    mut cancel_rx: mpsc::UnboundedReceiver<()>,
    mut on_event: impl FnMut(SenderEvent),
) -> SenderState {
    let mut state = SenderState::Initializing;
    state = sender_transition(state, SenderState::Listening);
    state = sender_transition(state, SenderState::Handshaking);

    macro_rules! cancel_and_return {
        ($by:expr) => {{
            state = sender_transition(state, SenderState::Cancelled);
            state = sender_transition(state, SenderState::Closed);
            channel.close().await;
            on_event(SenderEvent::Cancelled { cancelled_by: $by });
            return state;
        }};
    }

    macro_rules! error_and_return {
        ($msg:expr) => {{
            channel.close().await;
            on_event(SenderEvent::Error($msg));
            return state;
        }};
    }

    if let Err(e) = channel
        .send_control(P2pMessage::Hello { protocol_version: PROTOCOL_VERSION, session_id: session_id.clone() })
        .await
    {
        error_and_return!(e.to_string());
    }

    match await_control(&channel, &mut cancel_rx, config.handshake_timeout).await {
        Ok(ControlOrCancel::Control(P2pMessage::Hello { .. })) => {}
        Ok(ControlOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(ControlOrCancel::Closed) => {
            cancel_and_return!(CancelledBy::Peer)
        }
        Ok(ControlOrCancel::Cancel) => cancel_and_return!(CancelledBy::Us),
        Ok(ControlOrCancel::Control(other)) => error_and_return!(format!("unexpected message during handshake: {other:?}")),
        Err(e) => error_and_return!(e.to_string()),
    }

    state = sender_transition(state, SenderState::Negotiating);
    if let Err(e) = channel
        .send_control(P2pMessage::Meta { session_id: session_id.clone(), name, size: data.len() as u64, mime })
        .await
    {
        error_and_return!(e.to_string());
    }

    match await_control(&channel, &mut cancel_rx, config.handshake_timeout).await {
        Ok(ControlOrCancel::Control(P2pMessage::Ready {})) => {}
        Ok(ControlOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(ControlOrCancel::Closed) => {
            cancel_and_return!(CancelledBy::Peer)
        }
        Ok(ControlOrCancel::Cancel) => cancel_and_return!(CancelledBy::Us),
        Ok(ControlOrCancel::Control(other)) => error_and_return!(format!("unexpected message during negotiation: {other:?}")),
        Err(e) => error_and_return!(e.to_string()),
    }

    state = sender_transition(state, SenderState::Transferring);
    let total_size = data.len() as u64;
    let mut seq: u32 = 0;
    let mut offset: u64 = 0;
    let mut unacked: usize = 0;

    while (offset as usize) < data.len() {
        if cancel_rx.try_recv().is_ok() {
            cancel_and_return!(CancelledBy::Us);
        }

        let end = ((offset as usize) + config.chunk_size).min(data.len());
        let payload = data.slice(offset as usize..end);
        let chunk_len = payload.len() as u32;

        if let Err(e) = channel
            .send_control(P2pMessage::Chunk { seq, offset, size: chunk_len, total: total_size })
            .await
        {
            error_and_return!(e.to_string());
        }
        if let Err(e) = channel.send_binary(payload).await {
            error_and_return!(e.to_string());
        }

        match wait_for_buffer_drain(&channel, &config, &mut cancel_rx).await {
            DrainOutcome::Ready => {}
            DrainOutcome::Cancel => cancel_and_return!(CancelledBy::Us),
        }

        seq += 1;
        offset = end as u64;
        unacked += 1;
        on_event(SenderEvent::Progress { sent: offset, total: total_size });

        let at_window_limit = unacked >= config.max_unacked_chunks;
        let at_eof = offset as usize == data.len();
        if at_window_limit || at_eof {
            let mut remaining_acks = unacked;
            while remaining_acks > 0 {
                match await_control_with_heartbeat(&channel, &mut cancel_rx, config.watchdog_timeout, config.heartbeat_interval).await
                {
                    Ok(ControlOrCancel::Control(P2pMessage::ChunkAck { .. })) => {
                        remaining_acks -= 1;
                    }
                    Ok(ControlOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(ControlOrCancel::Closed) => {
                        cancel_and_return!(CancelledBy::Peer)
                    }
                    Ok(ControlOrCancel::Cancel) => cancel_and_return!(CancelledBy::Us),
                    Ok(ControlOrCancel::Control(other)) => {
                        debug!("ignoring non-ack control message mid-window: {other:?}");
                    }
                    Err(e) => error_and_return!(e.to_string()),
                }
            }
            unacked = 0;
        }
    }

    state = sender_transition(state, SenderState::Finishing);

    let mut attempt = 1;
    let mut end_ack_timeout = config.end_ack_timeout;
    loop {
        if let Err(e) = channel.send_control(P2pMessage::End { attempt }).await {
            error_and_return!(e.to_string());
        }
        state = sender_transition(state, SenderState::AwaitingAck);

        match await_control_with_heartbeat(&channel, &mut cancel_rx, end_ack_timeout, config.heartbeat_interval).await {
            Ok(ControlOrCancel::Control(P2pMessage::EndAck { received, total })) => {
                if received != total {
                    warn!(received, total, "end_ack reports short transfer");
                }
                break;
            }
            Ok(ControlOrCancel::Control(P2pMessage::Cancelled { .. })) | Ok(ControlOrCancel::Closed) => {
                cancel_and_return!(CancelledBy::Peer)
            }
            Ok(ControlOrCancel::Cancel) => cancel_and_return!(CancelledBy::Us),
            Ok(ControlOrCancel::Control(other)) => {
                debug!("ignoring non-end_ack control message: {other:?}");
                continue;
            }
            Err(_) if attempt < config.end_ack_retries => {
                attempt += 1;
                end_ack_timeout = end_ack_timeout.mul_f64(1.5);
                continue;
            }
            Err(e) => error_and_return!(e.to_string()),
        }
    }

    state = sender_transition(state, SenderState::Completed);
    state = sender_transition(state, SenderState::Closed);
    channel.close().await;
    on_event(SenderEvent::Completed);
    state
}

enum ControlOrCancel {
    Control(P2pMessage),
    Closed,
    Cancel,
}

async fn await_control(
    channel: &Arc<dyn DataChannel>,
    cancel_rx: &mut mpsc::UnboundedReceiver<()>,
    wait: std::time::Duration,
) -> Result<ControlOrCancel> {
    let recv_fut = channel.recv();
    tokio::select! {
        _ = cancel_rx.recv() => Ok(ControlOrCancel::Cancel),
        result = timeout(wait, recv_fut) => {
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

/// Like `await_control`, but keeps the link alive across a long wait by
/// emitting `ping` on `heartbeat_interval` (spec.md §4.6.6). Used anywhere the
/// sender blocks on a peer reply while `transferring`, `finishing`, or
/// `awaiting_ack`.
async fn await_control_with_heartbeat(
    channel: &Arc<dyn DataChannel>,
    cancel_rx: &mut mpsc::UnboundedReceiver<()>,
    wait: std::time::Duration,
    heartbeat_interval: std::time::Duration,
) -> Result<ControlOrCancel> {
    let deadline = Instant::now() + wait;
    let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    loop {
        tokio::select! {
            _ = cancel_rx.recv() => return Ok(ControlOrCancel::Cancel),
            _ = heartbeat.tick() => {
                if let Err(e) = channel.send_control(P2pMessage::Ping { timestamp: chrono::Utc::now().timestamp_millis() }).await {
                    return Err(e);
                }
            }
            result = timeout_at(deadline, channel.recv()) => {
                return match result {
                    Ok(Ok(ChannelEvent::Control(msg))) => Ok(ControlOrCancel::Control(msg)),
                    Ok(Ok(ChannelEvent::Binary(_))) => Err(DropgateError::protocol("unexpected binary frame waiting for control message")),
                    Ok(Ok(ChannelEvent::Closed)) => Ok(ControlOrCancel::Closed),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(DropgateError::timeout("peer did not respond in time")),
                };
            }
        }
    }
}

enum DrainOutcome {
    Ready,
    Cancel,
}

/// Secondary, buffer-based flow control (spec.md §4.6.4). Once the channel's
/// outstanding `buffered_amount` crosses the high water mark, pauses the
/// sender until it drains below the low water mark, polling every
/// `buffer_drain_poll_interval`.
async fn wait_for_buffer_drain(
    channel: &Arc<dyn DataChannel>,
    config: &TransferConfig,
    cancel_rx: &mut mpsc::UnboundedReceiver<()>,
) -> DrainOutcome {
    if channel.buffered_amount() <= config.buffer_high_water_mark {
        return DrainOutcome::Ready;
    }
    loop {
        tokio::select! {
            _ = cancel_rx.recv() => return DrainOutcome::Cancel,
            _ = sleep(config.buffer_drain_poll_interval) => {
                if channel.buffered_amount() <= config.buffer_low_water_mark {
                    return DrainOutcome::Ready;
                }
            }
        }
    }
}
