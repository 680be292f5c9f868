/// The two finite-state machines from spec.md §4.6.1. Each is an explicit
/// `enum` plus a single `transition` function that is the only place legal
/// edges are decided — engines never mutate state directly, they call
/// `transition` and reject (drop) the event if it returns `None`.
use dropgate_types::{DropgateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderState {
    Initializing,
    Listening,
    Handshaking,
    Negotiating,
    Transferring,
    Finishing,
    AwaitingAck,
    Completed,
    Cancelled,
    Closed,
}

impl SenderState {
    /// Whether `to` is a legal transition from `self`.
    pub fn can_transition_to(self, to: SenderState) -> bool {
        use SenderState::*;
        matches!(
            (self, to),
            (Initializing, Listening)
                | (Listening, Handshaking)
                | (Handshaking, Negotiating)
                | (Negotiating, Transferring)
                | (Transferring, Finishing)
                | (Finishing, AwaitingAck)
                | (AwaitingAck, Completed)
                | (Completed, Closed)
                | (Cancelled, Closed)
        ) || (to == Cancelled && self.can_cancel())
    }

    /// Any active (non-terminal) state may be cancelled.
    fn can_cancel(self) -> bool {
        !matches!(self, SenderState::Cancelled | SenderState::Closed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SenderState::Closed)
    }
}

/// Attempts `current -> to`. Returns the new state, or the unchanged state
/// with the event dropped (matches spec.md §4.6.1: "late events... are
/// dropped", not an error).
pub fn sender_transition(current: SenderState, to: SenderState) -> SenderState {
    if current.can_transition_to(to) {
        to
    } else {
        current
    }
}

pub fn sender_transition_checked(current: SenderState, to: SenderState) -> Result<SenderState> {
    if current.can_transition_to(to) {
        Ok(to)
    } else {
        Err(DropgateError::protocol(format!(
            "illegal sender transition {current:?} -> {to:?}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverState {
    Initializing,
    Connecting,
    Negotiating,
    Transferring,
    Completed,
    Cancelled,
    Closed,
}

impl ReceiverState {
    pub fn can_transition_to(self, to: ReceiverState) -> bool {
        use ReceiverState::*;
        matches!(
            (self, to),
            (Initializing, Connecting)
                | (Connecting, Negotiating)
                | (Negotiating, Transferring)
                | (Transferring, Completed)
                | (Completed, Closed)
                | (Cancelled, Closed)
        ) || (to == Cancelled && self.can_cancel())
    }

    fn can_cancel(self) -> bool {
        !matches!(self, ReceiverState::Cancelled | ReceiverState::Closed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiverState::Closed)
    }
}

pub fn receiver_transition(current: ReceiverState, to: ReceiverState) -> ReceiverState {
    if current.can_transition_to(to) {
        to
    } else {
        current
    }
}

pub fn receiver_transition_checked(current: ReceiverState, to: ReceiverState) -> Result<ReceiverState> {
    if current.can_transition_to(to) {
        Ok(to)
    } else {
        Err(DropgateError::protocol(format!(
            "illegal receiver transition {current:?} -> {to:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SenderState::*;

    #[test]
    fn sender_happy_path_edges_are_legal() {
        let path = [
            Initializing,
            Listening,
            Handshaking,
            Negotiating,
            Transferring,
            Finishing,
            AwaitingAck,
            Completed,
            Closed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn sender_can_cancel_from_any_active_state() {
        for state in [Listening, Handshaking, Negotiating, Transferring, Finishing, AwaitingAck] {
            assert!(state.can_transition_to(Cancelled));
        }
        assert!(Cancelled.can_transition_to(Closed));
    }

    #[test]
    fn sender_cannot_cancel_terminal_states() {
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Closed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn sender_rejects_illegal_skips() {
        assert!(!Initializing.can_transition_to(Transferring));
        assert!(!Listening.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Transferring));
    }

    #[test]
    fn late_events_are_dropped_not_errors() {
        // A `cancelled` arriving after `completed` is a late event: ignored.
        let state = sender_transition(Completed, Cancelled);
        assert_eq!(state, Completed);
    }

    #[test]
    fn receiver_happy_path_edges_are_legal() {
        use ReceiverState::*;
        let path = [Initializing, Connecting, Negotiating, Transferring, Completed, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn receiver_rejects_illegal_skips() {
        use ReceiverState::*;
        assert!(!Initializing.can_transition_to(Negotiating));
        assert!(!Connecting.can_transition_to(Completed));
    }
}
