//! # Chunked Transfer Reassembles in Any Order
//!
//! A 20 KiB payload against the default 8 KiB threshold goes out as
//! exactly three chunks and is rebuilt whatever order they arrive in.

/// Size of the 20 KiB test payload.
pub const PAYLOAD_LEN: usize = 20 * 1024;

/// Deterministic, non-repeating-at-chunk-size test payload.
pub fn payload() -> Vec<u8> {
    (0..PAYLOAD_LEN).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rand::seq::SliceRandom;
    use shared_crypto::IdentityKeyPair;
    use shared_types::{Envelope, MessageType, PeerAddress, PeerId, SystemTimeSource, TransportError};
    use wl_04_chunking::{ChunkConfig, ChunkError, ChunkManager, ChunkProgress};
    use wl_05_protocol_engine::{EngineConfig, Inbound, InMemoryNetwork, Transport};

    use super::*;
    use crate::support::{eventually, inbox, EngineMesh};

    const ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    fn sender() -> PeerId {
        PeerId::from_public_key(&IdentityKeyPair::from_seed([4; 32]).public_key())
    }

    fn manager() -> ChunkManager {
        ChunkManager::new(ChunkConfig::default(), Arc::new(SystemTimeSource::new()))
    }

    /// Forwards everything except CHUNK frames, which it keeps.
    struct HoldChunks {
        inner: Arc<InMemoryNetwork>,
        held: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl Transport for HoldChunks {
        async fn send(&self, to: &PeerAddress, frame: Vec<u8>) -> Result<(), TransportError> {
            let is_chunk = Envelope::from_bytes(&frame).is_ok_and(|e| e.msg_type == MessageType::Chunk);
            if is_chunk {
                self.held.lock().push(frame);
                return Ok(());
            }
            self.inner.send(to, frame).await
        }
    }

    #[test]
    fn test_twenty_kib_splits_into_three_chunks() {
        let frames = manager().split(&MessageType::Data, &payload()).unwrap();

        assert_eq!(frames.len(), 3);
        let sizes: Vec<_> = frames.iter().map(|f| f.data.len()).collect();
        assert_eq!(sizes, vec![8192, 8192, 4096]);
        assert!(frames.iter().all(|f| f.total == 3));
        assert!(frames.iter().all(|f| f.transfer_id == frames[0].transfer_id));
    }

    #[test]
    fn test_reassembles_in_every_order() {
        let frames = manager().split(&MessageType::Data, &payload()).unwrap();

        for order in ORDERS {
            let receiver = manager();
            let mut outcome = None;
            for (fed, &index) in order.iter().enumerate() {
                let progress = receiver.accept(sender(), frames[index].clone()).unwrap();
                if fed < 2 {
                    assert!(matches!(progress, ChunkProgress::Pending { total: 3, .. }));
                } else {
                    outcome = Some(progress);
                }
            }
            match outcome {
                Some(ChunkProgress::Complete(rebuilt)) => {
                    assert_eq!(rebuilt.data, payload(), "order {order:?}");
                    assert_eq!(rebuilt.msg_type, MessageType::Data);
                }
                other => panic!("order {order:?} ended with {other:?}"),
            }
        }
    }

    #[test]
    fn test_corrupt_chunk_aborts_transfer() {
        let mut frames = manager().split(&MessageType::Data, &payload()).unwrap();
        frames[1].data[0] ^= 0xff;
        let receiver = manager();

        assert!(receiver.accept(sender(), frames[0].clone()).is_ok());
        let err = receiver.accept(sender(), frames[1].clone()).unwrap_err();
        assert!(matches!(err, ChunkError::CorruptChunk { index: 1, .. }));

        let late = receiver.accept(sender(), frames[2].clone()).unwrap();
        assert_eq!(late, ChunkProgress::Discarded);
        assert!(receiver.is_closed(&sender(), &frames[0].transfer_id));
    }

    #[tokio::test]
    async fn test_engine_delivers_chunks_arriving_shuffled() {
        let mesh = EngineMesh::new();
        let holding = Arc::new(HoldChunks {
            inner: mesh.net.clone(),
            held: Mutex::new(Vec::new()),
        });
        let alice = mesh.node_via(1, EngineConfig::for_testing(), holding.clone());
        let bob = mesh.node(2, EngineConfig::for_testing());
        let received = inbox(&bob.engine, MessageType::Data);

        let receipt = alice
            .engine
            .send(bob.id, MessageType::Data, payload())
            .await
            .unwrap();
        assert_eq!(receipt.chunks, 3);
        assert_eq!(receipt.last_seq - receipt.first_seq, 2);

        let mut frames = std::mem::take(&mut *holding.held.lock());
        assert_eq!(frames.len(), 3);
        frames.shuffle(&mut rand::thread_rng());

        let mut outcomes = Vec::new();
        for frame in &frames {
            outcomes.push(bob.engine.receive(frame).await.unwrap());
        }
        assert!(outcomes[..2]
            .iter()
            .all(|o| matches!(o, Inbound::ChunkPending { total: 3, .. })));
        match &outcomes[2] {
            Inbound::Message(message) => {
                assert_eq!(message.data, payload());
                assert_eq!(message.sender, alice.id);
                assert!(message.transfer_id.is_some());
            }
            other => panic!("last chunk gave {other:?}"),
        }

        assert!(eventually(|| received.lock().len() == 1).await);
        assert_eq!(received.lock()[0].data.len(), PAYLOAD_LEN);
    }

    #[tokio::test]
    async fn test_engine_end_to_end_chunked_send() {
        let mesh = EngineMesh::new();
        let alice = mesh.node(1, EngineConfig::for_testing());
        let bob = mesh.node(2, EngineConfig::for_testing());
        let received = inbox(&bob.engine, MessageType::Data);

        let receipt = alice
            .engine
            .send(bob.id, MessageType::Data, payload())
            .await
            .unwrap();
        assert_eq!(receipt.chunks, 3);

        assert!(eventually(|| received.lock().len() == 1).await);
        assert_eq!(received.lock()[0].data, payload());
        assert_eq!(bob.engine.chunk_manager().active_transfers(), 0);
    }
}
