use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dropgate_p2p::fsm::{ReceiverState, SenderState};
use dropgate_p2p::receiver::{self, ReceiverEvent};
use dropgate_p2p::sender::{self, SenderEvent};
use dropgate_p2p::{TransferConfig, loopback_pair};

/// spec.md §8 scenario 5: a full 4 MiB transfer over 16 chunks, every chunk
/// acked, both sides end in `completed` -> `closed`.
#[tokio::test]
async fn full_transfer_completes_on_both_sides() {
    let (sender_chan, receiver_chan) = loopback_pair();
    let sender_chan: Arc<dyn dropgate_p2p::DataChannel> = Arc::new(sender_chan);
    let receiver_chan: Arc<dyn dropgate_p2p::DataChannel> = Arc::new(receiver_chan);

    let config = TransferConfig::default();
    let data = Bytes::from(vec![0x42u8; 4 * 1024 * 1024]);

    let (_sender_handle, sender_cancel_rx) = sender::sender_handle_pair();
    let (_receiver_handle, receiver_cancel_rx) = receiver::receiver_handle_pair();

    let sender_events: Arc<Mutex<Vec<SenderEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let receiver_events: Arc<Mutex<Vec<ReceiverEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let sender_events_clone = sender_events.clone();
    let sender_task = tokio::spawn({
        let data = data.clone();
        async move {
            sender::run_sender(
                sender_chan,
                "session-1".to_string(),
                "movie.mp4".to_string(),
                "video/mp4".to_string(),
                data,
                config.clone(),
                sender_cancel_rx,
                move |ev| sender_events_clone.lock().unwrap().push(ev),
            )
            .await
        }
    });

    let receiver_events_clone = receiver_events.clone();
    let config_for_receiver = TransferConfig::default();
    let receiver_task = tokio::spawn(async move {
        receiver::run_receiver(
            receiver_chan,
            config_for_receiver,
            receiver_cancel_rx,
            move |ev| receiver_events_clone.lock().unwrap().push(ev),
        )
        .await
    });

    let sender_final = sender_task.await.unwrap();
    let (receiver_final, received_file) = receiver_task.await.unwrap();

    assert_eq!(sender_final, SenderState::Closed);
    assert_eq!(receiver_final, ReceiverState::Closed);

    let received_file = received_file.expect("receiver should have assembled the file");
    assert_eq!(received_file.name, "movie.mp4");
    assert_eq!(received_file.mime, "video/mp4");
    assert_eq!(received_file.data, data);

    let sender_events = sender_events.lock().unwrap();
    assert_eq!(
        sender_events.iter().filter(|e| matches!(e, SenderEvent::Completed)).count(),
        1
    );
    assert!(sender_events.iter().all(|e| !matches!(e, SenderEvent::Error(_) | SenderEvent::Cancelled { .. })));

    let receiver_events = receiver_events.lock().unwrap();
    assert_eq!(
        receiver_events.iter().filter(|e| matches!(e, ReceiverEvent::Completed)).count(),
        1
    );
    assert!(receiver_events.iter().all(|e| !matches!(e, ReceiverEvent::Error(_) | ReceiverEvent::Cancelled { .. })));
}

/// spec.md §8 scenario 6: the receiver cancels partway through. The sender
/// must observe exactly one cancellation (attributed to the peer) and never
/// fire completion or error.
#[tokio::test]
async fn receiver_cancel_mid_transfer_is_observed_once_by_sender() {
    let (sender_chan, receiver_chan) = loopback_pair();
    let sender_chan: Arc<dyn dropgate_p2p::DataChannel> = Arc::new(sender_chan);
    let receiver_chan: Arc<dyn dropgate_p2p::DataChannel> = Arc::new(receiver_chan);

    let config = TransferConfig { chunk_size: 1024, ..Default::default() };
    let data = Bytes::from(vec![0x7au8; 5 * 1024]); // 5 chunks of 1 KiB

    let (_sender_handle, sender_cancel_rx) = sender::sender_handle_pair();
    let (receiver_handle, receiver_cancel_rx) = receiver::receiver_handle_pair();

    let sender_events: Arc<Mutex<Vec<SenderEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let receiver_events: Arc<Mutex<Vec<ReceiverEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let sender_events_clone = sender_events.clone();
    let sender_task = tokio::spawn({
        let config = config.clone();
        let data = data.clone();
        async move {
            sender::run_sender(
                sender_chan,
                "session-2".to_string(),
                "dataset.csv".to_string(),
                "text/csv".to_string(),
                data,
                config,
                sender_cancel_rx,
                move |ev| sender_events_clone.lock().unwrap().push(ev),
            )
            .await
        }
    });

    let receiver_events_clone = receiver_events.clone();
    let receiver_task = tokio::spawn(async move {
        receiver::run_receiver(receiver_chan, config, receiver_cancel_rx, move |ev| {
            if let ReceiverEvent::Progress { received, .. } = &ev {
                if *received >= 3 * 1024 {
                    receiver_handle.cancel();
                }
            }
            receiver_events_clone.lock().unwrap().push(ev);
        })
        .await
    });

    let sender_final = sender_task.await.unwrap();
    let (receiver_final, received_file) = receiver_task.await.unwrap();

    assert_eq!(sender_final, SenderState::Closed);
    assert_eq!(receiver_final, ReceiverState::Closed);
    assert!(received_file.is_none());

    let sender_events = sender_events.lock().unwrap();
    assert_eq!(
        sender_events
            .iter()
            .filter(|e| matches!(e, SenderEvent::Cancelled { cancelled_by: sender::CancelledBy::Peer }))
            .count(),
        1
    );
    assert!(sender_events.iter().all(|e| !matches!(e, SenderEvent::Completed | SenderEvent::Error(_))));

    let receiver_events = receiver_events.lock().unwrap();
    assert_eq!(
        receiver_events
            .iter()
            .filter(|e| matches!(e, ReceiverEvent::Cancelled { cancelled_by: receiver::CancelledBy::Us }))
            .count(),
        1
    );
    assert!(receiver_events.iter().all(|e| !matches!(e, ReceiverEvent::Completed | ReceiverEvent::Error(_))));
}
