//! Tests for the handshake and session lifecycle

use super::*;
use crate::domain::handshake::{decode_payload, HandshakeAck, HandshakeChallengeResponse, HandshakeInit};
use crate::domain::{HandshakeFrame, SessionConfig, SessionState};
use shared_crypto::IdentityKeyPair;
use shared_types::{MessageType, PeerId, ProtocolError, ReplayKind, Timestamp};
use std::sync::Arc;
use std::time::Duration;

struct Peer {
    identity: IdentityKeyPair,
    id: PeerId,
}

fn peer(seed: u8) -> Peer {
    let identity = IdentityKeyPair::from_seed([seed; 32]);
    let id = PeerId::from_public_key(&identity.public_key());
    Peer { identity, id }
}

fn t0() -> Timestamp {
    Timestamp::from_secs(1_700_000_000)
}

fn reply(step: Result<HandshakeStep, ProtocolError>) -> HandshakeFrame {
    match step {
        Ok(HandshakeStep::Reply(frame)) => frame,
        other => panic!("expected a reply, got {other:?}"),
    }
}

/// Sessions after messages 1 and 2, plus message 2 itself.
fn up_to_ack(
    alice: &Peer,
    bob: &Peer,
    alice_config: SessionConfig,
    bob_config: SessionConfig,
) -> (Session, Session, HandshakeFrame) {
    let (initiator, m1) =
        Session::initiate(bob.id, &alice.identity, Arc::new(alice_config), t0()).unwrap();
    let init: HandshakeInit = decode_payload(&m1.data).unwrap();
    let (responder, m2) = Session::accept(
        initiator.session_id(),
        alice.id,
        &bob.identity,
        &init,
        Arc::new(bob_config),
        t0(),
    )
    .unwrap();
    (initiator, responder, m2)
}

fn full_handshake(alice_config: SessionConfig, bob_config: SessionConfig) -> (Session, Session) {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, mut r, m2) = up_to_ack(&alice, &bob, alice_config, bob_config);
    let now = t0();

    let m3 = reply(i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, now));
    let m4 = reply(r.handle_handshake(&bob.identity, &m3.msg_type, &m3.data, now));
    let m5 = reply(i.handle_handshake(&alice.identity, &m4.msg_type, &m4.data, now));
    let m6 = reply(r.handle_handshake(&bob.identity, &m5.msg_type, &m5.data, now));
    assert_eq!(
        i.handle_handshake(&alice.identity, &m6.msg_type, &m6.data, now),
        Ok(HandshakeStep::Complete)
    );
    (i, r)
}

// =============================================================================
// Happy Path
// =============================================================================

#[test]
fn test_both_peers_derive_identical_keys() {
    let (i, r) = full_handshake(SessionConfig::for_testing(), SessionConfig::for_testing());

    assert_eq!(i.state(), SessionState::Ready);
    assert_eq!(r.state(), SessionState::Ready);
    assert_eq!(i.session_id(), r.session_id());
    assert_eq!(i.transcript_hash(), r.transcript_hash());

    let (ki, kr) = (i.session_keys().unwrap(), r.session_keys().unwrap());
    assert_eq!(ki.encryption_key().as_bytes(), kr.encryption_key().as_bytes());
    assert_eq!(ki.authentication_key().as_bytes(), kr.authentication_key().as_bytes());
    assert_ne!(ki.encryption_key().as_bytes(), ki.authentication_key().as_bytes());
}

#[test]
fn test_encrypted_round_trip_both_directions() {
    let (i, r) = full_handshake(SessionConfig::for_testing(), SessionConfig::for_testing());
    let now = t0();

    let sealed = i.encrypt(b"hello bob", b"header", now).unwrap();
    assert!(sealed.encrypted);
    assert_eq!(r.decrypt(&sealed, b"header", now).unwrap(), b"hello bob");

    let sealed = r.encrypt(b"hello alice", b"header-2", now).unwrap();
    assert_eq!(i.decrypt(&sealed, b"header-2", now).unwrap(), b"hello alice");
}

#[test]
fn test_decrypt_with_other_header_fails() {
    let (i, r) = full_handshake(SessionConfig::for_testing(), SessionConfig::for_testing());
    let sealed = i.encrypt(b"payload", b"seq=1", t0()).unwrap();

    assert_eq!(
        r.decrypt(&sealed, b"seq=2", t0()),
        Err(ProtocolError::DecryptionFailed)
    );
}

#[test]
fn test_state_changes_are_observable() {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, _r, m2) = up_to_ack(&alice, &bob, SessionConfig::for_testing(), SessionConfig::for_testing());
    let rx = i.subscribe();
    assert_eq!(*rx.borrow(), SessionState::HandshakeInitSent);

    reply(i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, t0()));
    assert_eq!(*rx.borrow(), SessionState::ChallengeSent);
}

// =============================================================================
// Capabilities
// =============================================================================

#[test]
fn test_capabilities_are_intersected() {
    let (i, r) = full_handshake(
        SessionConfig::for_testing().with_capabilities(["ext:files", "ext:chat"]),
        SessionConfig::for_testing().with_capabilities(["ext:files", "ext:video"]),
    );

    for session in [&i, &r] {
        assert_eq!(session.capabilities().collect::<Vec<_>>(), vec!["ext:files"]);
        assert!(session.check_capability(&MessageType::ext("files").unwrap()).is_ok());
        assert_eq!(
            session.check_capability(&MessageType::ext("chat").unwrap()),
            Err(ProtocolError::CapabilityNotNegotiated("ext:chat".into()))
        );
        assert!(session.check_capability(&MessageType::Data).is_ok());
    }
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_encryption_refused_before_ready() {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, _r, _m2) = up_to_ack(&alice, &bob, SessionConfig::for_testing(), SessionConfig::for_testing());

    assert_eq!(
        i.encrypt(b"too early", b"", t0()),
        Err(ProtocolError::EncryptionNotReady)
    );
    assert_eq!(i.next_send_seq(), Err(ProtocolError::EncryptionNotReady));
}

#[test]
fn test_tampered_challenge_signature_is_terminal() {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, mut r, m2) = up_to_ack(&alice, &bob, SessionConfig::for_testing(), SessionConfig::for_testing());
    let m3 = reply(i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, t0()));

    let mut forged: HandshakeChallengeResponse = decode_payload(&m3.data).unwrap();
    forged.challenge_signature = peer(9).identity.sign(b"something else");
    let forged = HandshakeFrame::encode(m3.msg_type.clone(), &forged).unwrap();

    assert_eq!(
        r.handle_handshake(&bob.identity, &forged.msg_type, &forged.data, t0()),
        Err(ProtocolError::ChallengeInvalid)
    );
    assert_eq!(r.state(), SessionState::Error);
    assert!(r.session_keys().is_none());

    // The genuine message cannot revive it.
    assert!(r.handle_handshake(&bob.identity, &m3.msg_type, &m3.data, t0()).is_err());
    assert_eq!(r.state(), SessionState::Error);
}

#[test]
fn test_late_challenge_response_is_expired() {
    let (alice, bob) = (peer(1), peer(2));
    let config = SessionConfig::for_testing();
    let ttl = config.challenge_ttl;
    let (mut i, mut r, m2) = up_to_ack(&alice, &bob, config.clone(), config);
    let m3 = reply(i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, t0()));

    let late = t0().saturating_add(ttl + Duration::from_millis(1));
    assert_eq!(
        r.handle_handshake(&bob.identity, &m3.msg_type, &m3.data, late),
        Err(ProtocolError::ChallengeExpired)
    );
    assert_eq!(r.state(), SessionState::Error);
}

#[test]
fn test_ack_from_wrong_identity_is_rejected() {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, _r, m2) = up_to_ack(&alice, &bob, SessionConfig::for_testing(), SessionConfig::for_testing());

    let mut ack: HandshakeAck = decode_payload(&m2.data).unwrap();
    ack.identity_key = peer(3).identity.public_key();
    let forged = HandshakeFrame::encode(MessageType::HandshakeAck, &ack).unwrap();

    assert_eq!(
        i.handle_handshake(&alice.identity, &forged.msg_type, &forged.data, t0()),
        Err(ProtocolError::InvalidSignature)
    );
    assert_eq!(i.state(), SessionState::Error);
}

#[test]
fn test_no_common_version() {
    let (alice, bob) = (peer(1), peer(2));
    let alice_config = SessionConfig {
        supported_versions: vec![2],
        ..SessionConfig::for_testing()
    };
    let (initiator, m1) = Session::initiate(bob.id, &alice.identity, Arc::new(alice_config), t0()).unwrap();
    let init: HandshakeInit = decode_payload(&m1.data).unwrap();

    let result = Session::accept(
        initiator.session_id(),
        alice.id,
        &bob.identity,
        &init,
        Arc::new(SessionConfig::for_testing()),
        t0(),
    );
    assert!(matches!(
        result,
        Err(ProtocolError::InvalidVersion { received: 2, supported: 1 })
    ));
}

#[test]
fn test_init_from_key_not_owning_sender_id() {
    let (alice, bob, mallory) = (peer(1), peer(2), peer(3));
    let (_, m1) = Session::initiate(bob.id, &mallory.identity, Arc::new(SessionConfig::for_testing()), t0()).unwrap();
    let init: HandshakeInit = decode_payload(&m1.data).unwrap();

    let result = Session::accept(
        uuid::Uuid::new_v4(),
        alice.id,
        &bob.identity,
        &init,
        Arc::new(SessionConfig::for_testing()),
        t0(),
    );
    assert!(matches!(result, Err(ProtocolError::InvalidSignature)));
}

#[test]
fn test_out_of_order_message_leaves_state_alone() {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, mut r, m2) = up_to_ack(&alice, &bob, SessionConfig::for_testing(), SessionConfig::for_testing());
    let m3 = reply(i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, t0()));
    let m4 = reply(r.handle_handshake(&bob.identity, &m3.msg_type, &m3.data, t0()));
    let m5 = reply(i.handle_handshake(&alice.identity, &m4.msg_type, &m4.data, t0()));

    // Initiator is waiting for READY; a message 2 replayed now is a duplicate.
    assert_eq!(
        i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, t0()),
        Ok(HandshakeStep::Duplicate(None))
    );
    // Message 5 is not something an initiator handles.
    assert!(matches!(
        i.handle_handshake(&alice.identity, &m5.msg_type, &m5.data, t0()),
        Err(ProtocolError::InvalidState { .. })
    ));
    assert_eq!(i.state(), SessionState::SessionConfirmed);
}

// =============================================================================
// Retransmission
// =============================================================================

#[test]
fn test_responder_resends_stored_reply_for_duplicate() {
    let (alice, bob) = (peer(1), peer(2));
    let (mut i, mut r, m2) = up_to_ack(&alice, &bob, SessionConfig::for_testing(), SessionConfig::for_testing());
    let m3 = reply(i.handle_handshake(&alice.identity, &m2.msg_type, &m2.data, t0()));
    let m4 = reply(r.handle_handshake(&bob.identity, &m3.msg_type, &m3.data, t0()));

    assert_eq!(
        r.handle_handshake(&bob.identity, &m3.msg_type, &m3.data, t0()),
        Ok(HandshakeStep::Duplicate(Some(m4)))
    );
    assert_eq!(r.state(), SessionState::SessionEstablished);
}

#[test]
fn test_duplicate_init_is_answered_but_a_different_one_is_refused() {
    let (alice, bob) = (peer(1), peer(2));
    let (initiator, m1) =
        Session::initiate(bob.id, &alice.identity, Arc::new(SessionConfig::for_testing()), t0()).unwrap();
    let init: HandshakeInit = decode_payload(&m1.data).unwrap();
    let (mut r, m2) = Session::accept(
        initiator.session_id(),
        alice.id,
        &bob.identity,
        &init,
        Arc::new(SessionConfig::for_testing()),
        t0(),
    )
    .unwrap();

    assert_eq!(
        r.handle_handshake(&bob.identity, &m1.msg_type, &m1.data, t0()),
        Ok(HandshakeStep::Duplicate(Some(m2)))
    );

    let (_, other_m1) =
        Session::initiate(bob.id, &alice.identity, Arc::new(SessionConfig::for_testing()), t0()).unwrap();
    assert_eq!(
        r.handle_handshake(&bob.identity, &other_m1.msg_type, &other_m1.data, t0()),
        Err(ProtocolError::HandshakeInProgress)
    );
}

#[test]
fn test_initiator_retransmits_until_limit() {
    let (alice, bob) = (peer(1), peer(2));
    let config = SessionConfig::for_testing();
    let (interval, max) = (config.retransmit_interval, config.max_retransmits);
    let (mut i, m1) = Session::initiate(bob.id, &alice.identity, Arc::new(config), t0()).unwrap();

    assert_eq!(i.due_retransmit(t0()), None);

    let mut now = t0();
    for _ in 0..max {
        now = now.saturating_add(interval);
        assert_eq!(i.due_retransmit(now), Some(m1.clone()));
    }
    now = now.saturating_add(interval);
    assert_eq!(i.due_retransmit(now), None);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_stalled_handshake_expires() {
    let (alice, bob) = (peer(1), peer(2));
    let config = SessionConfig::for_testing();
    let timeout = config.handshake_timeout;
    let (mut i, _m1) = Session::initiate(bob.id, &alice.identity, Arc::new(config), t0()).unwrap();

    assert!(!i.check_expiry(t0().saturating_add(timeout - Duration::from_millis(1))));
    assert!(i.check_expiry(t0().saturating_add(timeout)));
    assert_eq!(i.state(), SessionState::Expired);
    assert_eq!(i.due_retransmit(t0().saturating_add(timeout * 2)), None);
}

#[test]
fn test_ready_session_expires_after_lifetime() {
    let config = SessionConfig::for_testing();
    let lifetime = config.session_lifetime;
    let (mut i, _r) = full_handshake(config.clone(), config);

    let end = t0().saturating_add(lifetime);
    assert_eq!(i.encrypt(b"late", b"", end), Err(ProtocolError::SessionExpired));

    assert!(i.check_expiry(end));
    assert_eq!(i.state(), SessionState::Expired);
    assert_eq!(i.encrypt(b"late", b"", end), Err(ProtocolError::SessionExpired));
    assert!(i.session_keys().is_none());
}

#[test]
fn test_close_zeroizes_keys() {
    let (mut i, _r) = full_handshake(SessionConfig::for_testing(), SessionConfig::for_testing());
    i.close();
    assert_eq!(i.state(), SessionState::Expired);
    assert!(i.session_keys().is_none());
}

#[test]
fn test_sequence_numbers_and_replay() {
    let (mut i, mut r) = full_handshake(SessionConfig::for_testing(), SessionConfig::for_testing());

    assert_eq!(i.next_send_seq(), Ok(0));
    assert_eq!(i.next_send_seq(), Ok(1));

    assert!(r.check_sequence(0).is_ok());
    assert_eq!(
        r.check_sequence(0),
        Err(ProtocolError::ReplayDetected(ReplayKind::SequenceReused))
    );
    assert_eq!(r.expected_recv_seq(), 1);
}
