/// The injection seam between the FSM engines and a real transport.
///
/// Production code would implement `DataChannel` over a WebRTC data channel
/// and `SignallingBroker` over the rendezvous server's websocket, but no
/// WebRTC stack is wired up in this workspace — the engines only ever see
/// these traits, and tests exercise them against the loopback doubles below.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dropgate_types::{DropgateError, P2pMessage, Result};
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Control(P2pMessage),
    Binary(Bytes),
    Closed,
}

/// A bidirectional, reliable, message-oriented channel between two peers.
/// Mirrors the subset of an RTCDataChannel the engines actually use.
#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send_control(&self, msg: P2pMessage) -> Result<()>;
    async fn send_binary(&self, data: Bytes) -> Result<()>;
    /// Waits for the next event. Returns `ChannelEvent::Closed` once, then
    /// again on every subsequent call (never blocks forever after close).
    async fn recv(&self) -> Result<ChannelEvent>;
    /// Bytes queued for send but not yet flushed to the wire; engines use
    /// this for the backpressure watermarks in spec.md §4.6.
    fn buffered_amount(&self) -> usize;
    async fn close(&self);
}

/// Registers share codes and connects two registered peers.
#[async_trait]
pub trait SignallingBroker: Send + Sync {
    /// Claims `peer_id` in the broker's namespace. Fails if already taken
    /// (rendezvous.rs retries under a different code on failure).
    async fn register(&self, peer_id: &str) -> Result<()>;
    /// Blocks until some peer dials `peer_id`, then returns the channel.
    async fn accept(&self, peer_id: &str) -> Result<Box<dyn DataChannel>>;
    /// Connects to a peer that has already registered `peer_id`.
    async fn dial(&self, peer_id: &str) -> Result<Box<dyn DataChannel>>;
}

pub struct LoopbackChannel {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    rx: Mutex<mpsc::UnboundedReceiver<ChannelEvent>>,
    /// Bytes this side has sent that the peer hasn't drained via `recv` yet.
    outgoing: Arc<AtomicUsize>,
    /// The peer's own `outgoing` counter, credited down when we drain one of
    /// its binary frames.
    peer_outgoing: Arc<AtomicUsize>,
    closed: std::sync::atomic::AtomicBool,
}

/// Builds a connected pair of in-process channels (no sockets, no codec) for
/// use as a `DataChannel` test double.
pub fn loopback_pair() -> (LoopbackChannel, LoopbackChannel) {
    let (tx_a, rx_b) = mpsc::unbounded_channel();
    let (tx_b, rx_a) = mpsc::unbounded_channel();
    let a_outgoing = Arc::new(AtomicUsize::new(0));
    let b_outgoing = Arc::new(AtomicUsize::new(0));
    (
        LoopbackChannel {
            tx: tx_a,
            rx: Mutex::new(rx_a),
            outgoing: a_outgoing.clone(),
            peer_outgoing: b_outgoing.clone(),
            closed: std::sync::atomic::AtomicBool::new(false),
        },
        LoopbackChannel {
            tx: tx_b,
            rx: Mutex::new(rx_b),
            outgoing: b_outgoing,
            peer_outgoing: a_outgoing,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
    )
}

#[async_trait]
impl DataChannel for LoopbackChannel {
    async fn send_control(&self, msg: P2pMessage) -> Result<()> {
        self.tx
            .send(ChannelEvent::Control(msg))
            .map_err(|_| DropgateError::network("peer channel closed"))
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        self.outgoing.fetch_add(data.len(), Ordering::SeqCst);
        self.tx
            .send(ChannelEvent::Binary(data))
            .map_err(|_| DropgateError::network("peer channel closed"))
    }

    async fn recv(&self) -> Result<ChannelEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(ChannelEvent::Closed);
        }
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(ChannelEvent::Binary(b)) => {
                self.peer_outgoing.fetch_sub(b.len(), Ordering::SeqCst);
                Ok(ChannelEvent::Binary(b))
            }
            Some(ev) => Ok(ev),
            None => {
                self.closed.store(true, Ordering::SeqCst);
                Ok(ChannelEvent::Closed)
            }
        }
    }

    fn buffered_amount(&self) -> usize {
        self.outgoing.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.tx.send(ChannelEvent::Closed);
    }
}

/// In-memory `SignallingBroker` for tests: peers "dial" by looking up a
/// listener registered under the same code, exactly like the real broker's
/// websocket-based rendezvous but without a network hop.
pub struct LoopbackBroker {
    registered: Mutex<HashSet<String>>,
    listeners: Mutex<HashMap<String, mpsc::UnboundedSender<LoopbackChannel>>>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(HashSet::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignallingBroker for LoopbackBroker {
    async fn register(&self, peer_id: &str) -> Result<()> {
        let mut reg = self.registered.lock().await;
        if !reg.insert(peer_id.to_string()) {
            return Err(DropgateError::validation("code already registered"));
        }
        Ok(())
    }

    async fn accept(&self, peer_id: &str) -> Result<Box<dyn DataChannel>> {
        let mut rx = {
            let mut listeners = self.listeners.lock().await;
            let (tx, rx) = mpsc::unbounded_channel();
            listeners.insert(peer_id.to_string(), tx);
            rx
        };
        let channel = rx
            .recv()
            .await
            .ok_or_else(|| DropgateError::network("broker shut down while waiting for a dial"))?;
        Ok(Box::new(channel))
    }

    async fn dial(&self, peer_id: &str) -> Result<Box<dyn DataChannel>> {
        let (near, far) = loopback_pair();
        let listener = {
            let listeners = self.listeners.lock().await;
            listeners
                .get(peer_id)
                .cloned()
                .ok_or_else(|| DropgateError::network("no listener for that code"))?
        };
        listener
            .send(far)
            .map_err(|_| DropgateError::network("listener went away before accepting"))?;
        Ok(Box::new(near))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_pair_delivers_control_messages_both_ways() {
        let (a, b) = loopback_pair();
        a.send_control(P2pMessage::Ready {}).await.unwrap();
        match b.recv().await.unwrap() {
            ChannelEvent::Control(P2pMessage::Ready {}) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_one_side_is_observed_by_the_other() {
        let (a, b) = loopback_pair();
        a.close().await;
        match b.recv().await.unwrap() {
            ChannelEvent::Closed => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_connects_listener_to_dialer() {
        let broker = LoopbackBroker::new();
        broker.register("ABCD-1234").await.unwrap();

        let accept_fut = broker.accept("ABCD-1234");
        let dial_fut = broker.dial("ABCD-1234");
        let (listener_side, dialer_side) = tokio::join!(accept_fut, dial_fut);
        let listener_side = listener_side.unwrap();
        let dialer_side = dialer_side.unwrap();

        dialer_side.send_control(P2pMessage::Ready {}).await.unwrap();
        match listener_side.recv().await.unwrap() {
            ChannelEvent::Control(P2pMessage::Ready {}) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn registering_the_same_code_twice_fails() {
        let broker = LoopbackBroker::new();
        broker.register("WXYZ-0000").await.unwrap();
        assert!(broker.register("WXYZ-0000").await.is_err());
    }
}
