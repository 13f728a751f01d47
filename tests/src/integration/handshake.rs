//! # Handshake Survives a Lost Message
//!
//! The six-message handshake completes over a channel that loses one
//! message, and the first application message after it travels encrypted.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use shared_types::{Envelope, MessageType, ProtocolError, ReceiveError};
    use wl_02_session::SessionState;
    use wl_05_protocol_engine::EngineConfig;

    use crate::support::{eventually, inbox, EngineMesh};

    const HANDSHAKE: [MessageType; 6] = [
        MessageType::HandshakeInit,
        MessageType::HandshakeAck,
        MessageType::HandshakeChallengeResponse,
        MessageType::HandshakeSession,
        MessageType::HandshakeConfirm,
        MessageType::HandshakeReady,
    ];

    fn envelopes(frames: Vec<Vec<u8>>) -> Vec<Envelope> {
        frames
            .iter()
            .map(|frame| Envelope::from_bytes(frame).unwrap())
            .collect()
    }

    async fn handshake_losing(lost: MessageType) {
        let mesh = EngineMesh::new();
        let alice = mesh.node(1, EngineConfig::for_testing());
        let bob = mesh.node(2, EngineConfig::for_testing());
        let received = inbox(&bob.engine, MessageType::Data);
        mesh.net.set_recording(true);
        mesh.net.drop_next(lost.clone());

        let receipt = alice
            .engine
            .send(bob.id, MessageType::Data, b"first words".to_vec())
            .await
            .unwrap();

        assert_eq!(mesh.net.dropped(), 1, "{lost} was not lost");
        assert!(eventually(|| received.lock().len() == 1).await);
        assert_eq!(received.lock()[0].data, b"first words");
        assert_eq!(alice.engine.session_state(&bob.id), Some(SessionState::Ready));
        assert_eq!(bob.engine.session_state(&alice.id), Some(SessionState::Ready));

        let to_bob = envelopes(mesh.net.recorded_to(&bob.address));
        let to_alice = envelopes(mesh.net.recorded_to(&alice.address));
        let seen: BTreeSet<MessageType> = to_bob
            .iter()
            .chain(&to_alice)
            .map(|e| e.msg_type.clone())
            .collect();
        for step in HANDSHAKE {
            assert!(seen.contains(&step), "{step} never delivered");
        }
        assert!(to_bob
            .iter()
            .chain(&to_alice)
            .filter(|e| e.msg_type.is_handshake())
            .all(|e| e.session_id == Some(receipt.session_id)));

        let data: Vec<_> = to_bob
            .iter()
            .filter(|e| e.msg_type == MessageType::Data)
            .collect();
        assert_eq!(data.len(), 1);
        assert!(data[0].payload.encrypted);
        assert!(data[0].payload.aead_nonce.is_some());
        assert!(!data[0]
            .payload
            .data
            .windows(b"first words".len())
            .any(|w| w == b"first words"));
    }

    #[tokio::test]
    async fn test_handshake_survives_lost_challenge_response() {
        handshake_losing(MessageType::HandshakeChallengeResponse).await;
    }

    #[tokio::test]
    async fn test_handshake_survives_lost_session_message() {
        handshake_losing(MessageType::HandshakeSession).await;
    }

    #[tokio::test]
    async fn test_replayed_data_frame_rejected_after_handshake() {
        let mesh = EngineMesh::new();
        let alice = mesh.node(1, EngineConfig::for_testing());
        let bob = mesh.node(2, EngineConfig::for_testing());
        let received = inbox(&bob.engine, MessageType::Data);
        mesh.net.set_recording(true);

        alice
            .engine
            .send(bob.id, MessageType::Data, b"once".to_vec())
            .await
            .unwrap();
        assert!(eventually(|| received.lock().len() == 1).await);

        let frame = mesh
            .net
            .recorded_to(&bob.address)
            .into_iter()
            .find(|frame| {
                Envelope::from_bytes(frame).is_ok_and(|e| e.msg_type == MessageType::Data)
            })
            .unwrap();
        let err = bob.engine.receive(&frame).await.unwrap_err();
        assert!(matches!(
            err,
            ReceiveError::Protocol(ProtocolError::ReplayDetected(_))
        ));
        assert_eq!(received.lock().len(), 1);
    }
}
