//! Signature transport backed by a tokio mpsc channel.

use crate::domain::SignatureShare;
use crate::error::TransportError;
use crate::ports::SignatureTransport;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Pushes outbound shares into an unbounded channel.
///
/// The receiving half is typically bridged to the real P2P layer, or, in
/// tests, fed straight into other nodes' `process_signature_share`.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<SignatureShare>,
}

impl ChannelTransport {
    /// Create a transport and the receiver of everything it broadcasts.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignatureShare>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SignatureTransport for ChannelTransport {
    async fn broadcast_share(&self, share: &SignatureShare) -> Result<(), TransportError> {
        self.tx
            .send(share.clone())
            .map_err(|_| TransportError("transport channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::ValidatorKeyPair;

    #[tokio::test]
    async fn test_broadcast_delivers_share() {
        let key = ValidatorKeyPair::generate();
        let share = SignatureShare {
            request_id: 9,
            signer: key.address(),
            signature: key.sign_hash(&[1u8; 32]).unwrap(),
        };

        let (transport, mut rx) = ChannelTransport::new();
        transport.broadcast_share(&share).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), share);
    }

    #[tokio::test]
    async fn test_broadcast_after_receiver_dropped() {
        let key = ValidatorKeyPair::generate();
        let share = SignatureShare {
            request_id: 9,
            signer: key.address(),
            signature: key.sign_hash(&[1u8; 32]).unwrap(),
        };

        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(transport.broadcast_share(&share).await.is_err());
    }
}
