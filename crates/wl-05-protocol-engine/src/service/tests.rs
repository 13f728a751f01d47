//! Tests for SessionProtocolEngine

use super::*;
use crate::adapters::{InMemoryNetwork, StaticAddressBook};
use crate::domain::{DecodedMessage, EngineConfig, Inbound};
use parking_lot::Mutex;
use shared_crypto::IdentityKeyPair;
use shared_types::{
    AdmissionError, Envelope, ManualTimeSource, MessageClass, MessageType, Payload, PeerAddress,
    PeerId, ProtocolError, ReceiveError, ReplayKind, SendError, SystemTimeSource, TimeSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wl_02_session::{Role, SessionState};
use wl_03_admission::ClassLimit;

struct Mesh {
    net: Arc<InMemoryNetwork>,
    book: Arc<StaticAddressBook>,
}

struct Node {
    engine: Arc<SessionProtocolEngine>,
    identity: Arc<IdentityKeyPair>,
    id: PeerId,
    address: PeerAddress,
}

impl Mesh {
    fn new() -> Self {
        Self {
            net: InMemoryNetwork::new(),
            book: Arc::new(StaticAddressBook::new()),
        }
    }

    fn node(&self, seed: u8, config: EngineConfig) -> Node {
        self.node_with_clock(seed, config, Arc::new(SystemTimeSource::new()))
    }

    fn node_with_clock(&self, seed: u8, config: EngineConfig, clock: Arc<dyn TimeSource>) -> Node {
        let identity = Arc::new(IdentityKeyPair::from_seed([seed; 32]));
        let id = PeerId::from_public_key(&identity.public_key());
        let address = PeerAddress::new(format!("mem://node-{seed}"));
        let engine = SessionProtocolEngine::new(
            identity.clone(),
            config,
            self.net.clone(),
            self.book.clone(),
            clock,
        );
        self.net.register(address.clone(), &engine);
        self.book.insert(id, address.clone());
        Node {
            engine,
            identity,
            id,
            address,
        }
    }
}

fn inbox(engine: &SessionProtocolEngine, msg_type: MessageType) -> Arc<Mutex<Vec<DecodedMessage>>> {
    let inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = inbox.clone();
    engine.register_handler(msg_type, move |message: &DecodedMessage| {
        sink.lock().push(message.clone());
    });
    inbox
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn peer(seed: u8) -> PeerId {
    PeerId::from_public_key(&IdentityKeyPair::from_seed([seed; 32]).public_key())
}

// =============================================================================
// Sending
// =============================================================================

#[tokio::test]
async fn test_send_establishes_session_and_delivers() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let received = inbox(&bob.engine, MessageType::Data);

    let receipt = alice
        .engine
        .send(bob.id, MessageType::Data, b"hello".to_vec())
        .await
        .unwrap();
    assert_eq!(receipt.first_seq, 0);
    assert_eq!(receipt.chunks, 0);

    assert!(eventually(|| received.lock().len() == 1).await);
    let message = received.lock()[0].clone();
    assert_eq!(message.data, b"hello");
    assert_eq!(message.sender, alice.id);
    assert_eq!(message.session_id, receipt.session_id);
    assert_eq!(message.transfer_id, None);

    assert_eq!(alice.engine.session_state(&bob.id), Some(SessionState::Ready));
    assert_eq!(bob.engine.session_state(&alice.id), Some(SessionState::Ready));
}

#[tokio::test]
async fn test_second_send_reuses_session() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());

    let first = alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();
    let second = alice.engine.send(bob.id, MessageType::Data, vec![2]).await.unwrap();

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(second.first_seq, 1);
    assert_eq!(alice.engine.session_count(), 1);
}

#[tokio::test]
async fn test_lost_challenge_response_is_retransmitted() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let received = inbox(&bob.engine, MessageType::Data);
    mesh.net.drop_next(MessageType::HandshakeChallengeResponse);

    alice
        .engine
        .send(bob.id, MessageType::Data, b"after a loss".to_vec())
        .await
        .unwrap();

    assert_eq!(mesh.net.dropped(), 1);
    assert!(eventually(|| received.lock().len() == 1).await);
    assert_eq!(received.lock()[0].data, b"after a loss");
}

#[tokio::test]
async fn test_lost_responder_reply_is_resent_on_duplicate() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    mesh.net.drop_next(MessageType::HandshakeSession);

    alice.engine.send(bob.id, MessageType::Data, vec![7]).await.unwrap();
    assert_eq!(mesh.net.dropped(), 1);
    assert_eq!(alice.engine.session_state(&bob.id), Some(SessionState::Ready));
}

#[tokio::test]
async fn test_large_payload_goes_out_in_chunks() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let received = inbox(&bob.engine, MessageType::Data);
    let payload: Vec<u8> = (0..20 * 1024).map(|i| (i % 251) as u8).collect();

    let receipt = alice
        .engine
        .send(bob.id, MessageType::Data, payload.clone())
        .await
        .unwrap();
    assert_eq!(receipt.chunks, 3);
    assert_eq!((receipt.first_seq, receipt.last_seq), (0, 2));

    assert!(eventually(|| received.lock().len() == 1).await);
    let message = received.lock()[0].clone();
    assert_eq!(message.data, payload);
    assert!(message.transfer_id.is_some());
    assert_eq!(bob.engine.chunk_manager().active_transfers(), 0);
}

#[tokio::test]
async fn test_non_application_type_refused() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());

    let err = alice
        .engine
        .send(bob.id, MessageType::Heartbeat, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Protocol(ProtocolError::MalformedMessage(_))));
    assert_eq!(alice.engine.session_count(), 0);
}

#[tokio::test]
async fn test_unknown_peer_is_unreachable() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());

    let err = alice
        .engine
        .send(peer(9), MessageType::Data, vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Transport(_)));
    assert_eq!(alice.engine.session_count(), 0);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let mesh = Mesh::new();
    let config = EngineConfig {
        send_timeout: Duration::from_millis(300),
        ..EngineConfig::for_testing()
    };
    let alice = mesh.node(1, config);
    let bob = mesh.node(2, EngineConfig::for_testing());
    mesh.net.drop_when(|_, _| true);

    let err = alice
        .engine
        .send(bob.id, MessageType::Data, vec![1])
        .await
        .unwrap_err();
    assert_eq!(err, SendError::HandshakeTimeout(Duration::from_millis(300)));
}

// =============================================================================
// Capabilities
// =============================================================================

#[tokio::test]
async fn test_extension_requires_negotiated_capability() {
    let mesh = Mesh::new();
    let mut config = EngineConfig::for_testing();
    config.session = config.session.with_capabilities(["ext:chat"]);
    let alice = mesh.node(1, config);
    let bob = mesh.node(2, EngineConfig::for_testing());

    let err = alice
        .engine
        .send(bob.id, MessageType::ext("chat").unwrap(), b"hi".to_vec())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SendError::Protocol(ProtocolError::CapabilityNotNegotiated("ext:chat".into()))
    );
}

#[tokio::test]
async fn test_extension_delivered_when_both_sides_offer_it() {
    let mesh = Mesh::new();
    let mut config = EngineConfig::for_testing();
    config.session = config.session.with_capabilities(["ext:chat"]);
    let alice = mesh.node(1, config.clone());
    let bob = mesh.node(2, config);
    let chat = MessageType::ext("chat").unwrap();
    let received = inbox(&bob.engine, chat.clone());

    alice.engine.send(bob.id, chat.clone(), b"hi".to_vec()).await.unwrap();

    assert!(eventually(|| received.lock().len() == 1).await);
    assert_eq!(received.lock()[0].msg_type, chat);
}

// =============================================================================
// Inbound validation
// =============================================================================

/// Alice sends one message with recording on; returns the frame bob got.
async fn recorded_data_frame(mesh: &Mesh, alice: &Node, bob: &Node) -> Vec<u8> {
    let received = inbox(&bob.engine, MessageType::Data);
    mesh.net.set_recording(true);
    alice.engine.send(bob.id, MessageType::Data, b"once".to_vec()).await.unwrap();
    assert!(eventually(|| received.lock().len() == 1).await);
    mesh.net.recorded_to(&bob.address).pop().unwrap()
}

#[tokio::test]
async fn test_replayed_frame_rejected() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let frame = recorded_data_frame(&mesh, &alice, &bob).await;

    assert_eq!(
        bob.engine.receive(&frame).await,
        Err(ReceiveError::Protocol(ProtocolError::ReplayDetected(ReplayKind::NonceReused)))
    );
}

#[tokio::test]
async fn test_tampered_frame_rejected() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let frame = recorded_data_frame(&mesh, &alice, &bob).await;

    let mut envelope = Envelope::from_bytes(&frame).unwrap();
    envelope.payload.data[0] ^= 0x01;
    assert_eq!(
        bob.engine.receive(&envelope.to_bytes().unwrap()).await,
        Err(ReceiveError::Protocol(ProtocolError::InvalidSignature))
    );
}

#[tokio::test]
async fn test_unsupported_version_checked_first() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let frame = recorded_data_frame(&mesh, &alice, &bob).await;

    // Signature is now wrong too, but the version gate comes first.
    let mut envelope = Envelope::from_bytes(&frame).unwrap();
    envelope.version = 2;
    assert_eq!(
        bob.engine.receive(&envelope.to_bytes().unwrap()).await,
        Err(ReceiveError::Protocol(ProtocolError::InvalidVersion {
            received: 2,
            supported: 1
        }))
    );
}

#[tokio::test]
async fn test_resealed_copy_with_used_sequence_rejected() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let frame = recorded_data_frame(&mesh, &alice, &bob).await;

    // Fresh nonce and signature, same sequence number.
    let mut envelope = Envelope::from_bytes(&frame).unwrap();
    envelope.nonce = Uuid::new_v4();
    envelope.sign(&alice.identity).unwrap();
    assert_eq!(
        bob.engine.receive(&envelope.to_bytes().unwrap()).await,
        Err(ReceiveError::Protocol(ProtocolError::ReplayDetected(ReplayKind::SequenceReused)))
    );
}

#[tokio::test]
async fn test_message_for_unknown_session_rejected() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());

    let envelope = Envelope::new(
        MessageType::Data,
        alice.id,
        bob.id,
        Some(Uuid::new_v4()),
        0,
        SystemTimeSource::new().now(),
        Payload::plain(b"no session".to_vec()),
    )
    .signed(&alice.identity)
    .unwrap();

    assert_eq!(
        bob.engine.receive(&envelope.to_bytes().unwrap()).await,
        Err(ReceiveError::Protocol(ProtocolError::SessionNotFound))
    );
}

#[tokio::test]
async fn test_frame_for_another_node_rejected() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());

    let envelope = Envelope::new(
        MessageType::Heartbeat,
        alice.id,
        peer(7),
        Some(Uuid::new_v4()),
        0,
        SystemTimeSource::new().now(),
        Payload::plain(Vec::new()),
    )
    .signed(&alice.identity)
    .unwrap();

    assert!(matches!(
        bob.engine.receive(&envelope.to_bytes().unwrap()).await,
        Err(ReceiveError::Protocol(ProtocolError::MalformedMessage(_)))
    ));
}

#[tokio::test]
async fn test_sequence_gap_is_filled() {
    let mesh = Mesh::new();
    let mut config = EngineConfig::for_testing();
    config.session.forward_window = 4;
    let alice = mesh.node(1, config.clone());
    let bob = mesh.node(2, config);
    let received = inbox(&bob.engine, MessageType::Data);

    let mut lost = 0;
    mesh.net.drop_when(move |_, envelope| {
        if envelope.msg_type == MessageType::Data && lost < 4 {
            lost += 1;
            return true;
        }
        false
    });

    for i in 0..5u8 {
        alice.engine.send(bob.id, MessageType::Data, vec![i]).await.unwrap();
    }

    // Sequence 4 lands outside bob's window, bob asks for 0..=4 again.
    assert!(eventually(|| received.lock().len() == 5).await);
    let mut payloads: Vec<u8> = received.lock().iter().map(|m| m.data[0]).collect();
    payloads.sort_unstable();
    assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    assert_eq!(mesh.net.dropped(), 4);
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn test_no_gap_fill_request_for_rate_limited_sender() {
    let mesh = Mesh::new();
    let mut config = EngineConfig::for_testing();
    config.session.forward_window = 4;
    let alice = mesh.node(1, config.clone());
    config.admission.data = ClassLimit::new(1, 0);
    let bob = mesh.node(2, config);
    let received = inbox(&bob.engine, MessageType::Data);

    alice.engine.send(bob.id, MessageType::Data, vec![0]).await.unwrap();
    assert!(eventually(|| received.lock().len() == 1).await);
    mesh.net.set_recording(true);

    // Far ahead of bob's window, from a sender with no tokens left.
    let frame = {
        let slot = alice.engine.slot(&bob.id, Role::Initiator).unwrap();
        let slot = slot.lock();
        alice
            .engine
            .seal(&slot.session, bob.id, MessageType::Data, 10, b"ahead")
            .unwrap()
            .to_bytes()
            .unwrap()
    };
    assert_eq!(
        bob.engine.receive(&frame).await,
        Err(ReceiveError::Protocol(ProtocolError::SequenceError {
            expected: 1,
            received: 10
        }))
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let gap_fills = mesh
        .net
        .recorded_to(&alice.address)
        .iter()
        .filter_map(|frame| Envelope::from_bytes(frame).ok())
        .filter(|envelope| envelope.msg_type == MessageType::GapFill)
        .count();
    assert_eq!(gap_fills, 0);
}

#[tokio::test]
async fn test_rate_limited_sender_backs_off() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let mut strict = EngineConfig::for_testing();
    strict.admission.data = ClassLimit::new(2, 1);
    let bob = mesh.node(2, strict);
    let received = inbox(&bob.engine, MessageType::Data);

    for i in 0..3u8 {
        alice.engine.send(bob.id, MessageType::Data, vec![i]).await.unwrap();
    }

    assert!(eventually(|| alice.engine.backoff.contains_key(&(bob.id, MessageClass::Data))).await);
    assert_eq!(received.lock().len(), 2);
    assert_eq!(
        alice.engine.send(bob.id, MessageType::Data, vec![9]).await,
        Err(SendError::Admission(AdmissionError::RateLimited {
            class: MessageClass::Data
        }))
    );
    // Other classes are unaffected.
    assert!(alice.engine.heartbeat(bob.id).await.is_ok());
}

// =============================================================================
// Teardown and lifecycle
// =============================================================================

#[tokio::test]
async fn test_teardown_closes_both_sides() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let first = alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();

    assert_eq!(alice.engine.teardown(bob.id).await, Ok(1));
    assert_eq!(alice.engine.session_state(&bob.id), None);
    assert!(eventually(|| bob.engine.session_state(&alice.id).is_none()).await);
    assert!(bob.engine.is_tombstoned(&first.session_id));

    let second = alice.engine.send(bob.id, MessageType::Data, vec![2]).await.unwrap();
    assert_ne!(first.session_id, second.session_id);
}

#[tokio::test]
async fn test_teardown_without_session() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());

    assert_eq!(
        alice.engine.teardown(peer(2)).await,
        Err(SendError::Protocol(ProtocolError::SessionNotFound))
    );
}

#[tokio::test]
async fn test_restarted_peer_replaces_old_session() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let received = inbox(&bob.engine, MessageType::Data);
    let before = alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();

    // Same identity, fresh engine, no memory of the old session.
    let restarted = mesh.node(1, EngineConfig::for_testing());
    let after = restarted.engine.send(bob.id, MessageType::Data, vec![2]).await.unwrap();

    assert_ne!(before.session_id, after.session_id);
    assert!(eventually(|| received.lock().len() == 2).await);
    assert!(bob.engine.is_tombstoned(&before.session_id));
}

#[tokio::test]
async fn test_heartbeat_needs_ready_session() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());

    assert_eq!(
        alice.engine.heartbeat(bob.id).await,
        Err(SendError::Protocol(ProtocolError::SessionNotFound))
    );
    alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();
    assert_eq!(alice.engine.heartbeat(bob.id).await, Ok(1));
}

#[tokio::test]
async fn test_delivery_hook_sees_every_message() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    bob.engine.set_delivery_hook(move |_: &DecodedMessage| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();
    alice.engine.send(bob.id, MessageType::Data, vec![2; 20_000]).await.unwrap();

    assert!(eventually(|| delivered.load(Ordering::SeqCst) == 2).await);
}

#[tokio::test]
async fn test_replayed_handshake_init_rejected() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let bob = mesh.node(2, EngineConfig::for_testing());
    mesh.net.set_recording(true);
    let receipt = alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();

    // Message 1 is caught by the nonce cache before it reaches the session.
    let first = mesh.net.recorded_to(&bob.address).remove(0);
    assert_eq!(
        bob.engine.receive(&first).await,
        Err(ReceiveError::Protocol(ProtocolError::ReplayDetected(ReplayKind::NonceReused)))
    );
    assert_eq!(bob.engine.session_state(&alice.id), Some(SessionState::Ready));

    // A fresh copy of the same init is a duplicate, answered but harmless.
    let mut envelope = Envelope::from_bytes(&first).unwrap();
    envelope.nonce = Uuid::new_v4();
    envelope.sign(&alice.identity).unwrap();
    assert_eq!(
        bob.engine.receive(&envelope.to_bytes().unwrap()).await,
        Ok(Inbound::Handshake {
            session_id: receipt.session_id,
            state: SessionState::Ready
        })
    );
}

// =============================================================================
// Maintenance
// =============================================================================

#[tokio::test]
async fn test_stalled_handshake_expires_in_maintenance() {
    let mesh = Mesh::new();
    let clock = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let alice = mesh.node_with_clock(1, EngineConfig::for_testing(), clock.clone());
    let bob = mesh.node_with_clock(2, EngineConfig::for_testing(), clock.clone());
    mesh.net.drop_when(|_, _| true);

    let pending = {
        let engine = alice.engine.clone();
        let bob_id = bob.id;
        tokio::spawn(async move { engine.send(bob_id, MessageType::Data, vec![1]).await })
    };
    assert!(eventually(|| alice.engine.session_state(&bob.id) == Some(SessionState::HandshakeInitSent)).await);

    clock.advance(Duration::from_secs(6));
    let report = alice.engine.run_maintenance(clock.now());
    assert_eq!(report.handshakes_expired, 1);
    assert_eq!(report.sessions_removed, 1);
    assert_eq!(alice.engine.session_count(), 0);

    assert_eq!(
        pending.await.unwrap(),
        Err(SendError::HandshakeTimeout(Duration::from_secs(5)))
    );
}

#[tokio::test]
async fn test_stalled_handshake_expires_without_maintenance() {
    let mesh = Mesh::new();
    let clock = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let alice = mesh.node_with_clock(1, EngineConfig::for_testing(), clock.clone());
    let bob = mesh.node_with_clock(2, EngineConfig::for_testing(), clock.clone());
    let received = inbox(&bob.engine, MessageType::Data);
    mesh.net
        .drop_when(|_, envelope| envelope.msg_type == MessageType::HandshakeAck);

    let pending = {
        let engine = alice.engine.clone();
        let bob_id = bob.id;
        tokio::spawn(async move { engine.send(bob_id, MessageType::Data, vec![1]).await })
    };
    assert!(eventually(|| alice.engine.session_state(&bob.id) == Some(SessionState::HandshakeInitSent)).await);
    assert!(eventually(|| bob.engine.session_state(&alice.id).is_some()).await);

    clock.advance(Duration::from_secs(6));
    assert_eq!(
        pending.await.unwrap(),
        Err(SendError::HandshakeTimeout(Duration::from_secs(5)))
    );
    assert!(eventually(|| alice.engine.session_state(&bob.id).is_none()).await);
    assert!(eventually(|| alice.engine.tombstones.len() == 1).await);

    // Bob still holds his half of the dead handshake; the new INIT must
    // not be refused as a competing handshake.
    mesh.net.clear_filter();
    let receipt = alice.engine.send(bob.id, MessageType::Data, vec![2]).await.unwrap();
    assert!(!alice.engine.is_tombstoned(&receipt.session_id));
    assert_eq!(alice.engine.session_state(&bob.id), Some(SessionState::Ready));
    assert!(eventually(|| received.lock().len() == 1).await);
    assert_eq!(received.lock()[0].data, vec![2]);
}

#[tokio::test]
async fn test_tombstones_and_nonces_purged_after_retention() {
    let mesh = Mesh::new();
    let clock = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let alice = mesh.node_with_clock(1, EngineConfig::for_testing(), clock.clone());
    let bob = mesh.node_with_clock(2, EngineConfig::for_testing(), clock.clone());

    alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();
    alice.engine.teardown(bob.id).await.unwrap();
    assert_eq!(alice.engine.tombstones.len(), 1);

    clock.advance(Duration::from_secs(601));
    let report = alice.engine.run_maintenance(clock.now());
    assert_eq!(report.tombstones_purged, 1);
    assert!(report.nonces_purged > 0);
    assert!(alice.engine.tombstones.is_empty());
}

#[tokio::test]
async fn test_ready_session_expires_after_lifetime() {
    let mesh = Mesh::new();
    let clock = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let alice = mesh.node_with_clock(1, EngineConfig::for_testing(), clock.clone());
    let bob = mesh.node_with_clock(2, EngineConfig::for_testing(), clock.clone());
    alice.engine.send(bob.id, MessageType::Data, vec![1]).await.unwrap();

    clock.advance(Duration::from_secs(601));
    let report = alice.engine.run_maintenance(clock.now());
    assert_eq!(report.sessions_expired, 1);
    assert_eq!(alice.engine.session_state(&bob.id), None);
}

#[tokio::test]
async fn test_maintenance_loop_stops_on_shutdown() {
    let mesh = Mesh::new();
    let alice = mesh.node(1, EngineConfig::for_testing());
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = alice.engine.spawn_maintenance(Duration::from_millis(10), rx);
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}
