/// Share-code allocation against a `SignallingBroker` (spec.md §3, §4.6):
/// generate a candidate code, try to register it, and retry under a fresh
/// code on collision, up to `maxAttempts` (default 4).
use dropgate_crypto::sharecode;
use dropgate_types::{DropgateError, Result};

use crate::channel::SignallingBroker;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

pub async fn allocate_code(broker: &dyn SignallingBroker, max_attempts: u32) -> Result<String> {
    let mut last_err = None;
    for _ in 0..max_attempts.max(1) {
        let code = sharecode::generate_code();
        match broker.register(&code).await {
            Ok(()) => return Ok(code),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| DropgateError::network("rendezvous broker unreachable")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LoopbackBroker;

    #[tokio::test]
    async fn allocates_a_valid_code_on_first_try() {
        let broker = LoopbackBroker::new();
        let code = allocate_code(&broker, DEFAULT_MAX_ATTEMPTS).await.unwrap();
        assert!(dropgate_crypto::sharecode::is_valid_code(&code));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_when_broker_always_collides() {
        struct AlwaysTaken;
        #[async_trait::async_trait]
        impl SignallingBroker for AlwaysTaken {
            async fn register(&self, _peer_id: &str) -> Result<()> {
                Err(DropgateError::validation("taken"))
            }
            async fn accept(&self, _peer_id: &str) -> Result<Box<dyn crate::channel::DataChannel>> {
                unreachable!()
            }
            async fn dial(&self, _peer_id: &str) -> Result<Box<dyn crate::channel::DataChannel>> {
                unreachable!()
            }
        }

        let broker = AlwaysTaken;
        let result = allocate_code(&broker, 3).await;
        assert!(result.is_err());
    }
}
