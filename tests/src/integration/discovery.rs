//! # Discovery-Driven Messaging
//!
//! Peers know each other only by id. Addresses and capabilities come from
//! signed DHT registrations; sessions are set up on first send.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared_crypto::IdentityKeyPair;
    use shared_types::{MessageType, PeerAddress, SystemTimeSource};
    use wl_01_dht::InMemoryDhtNetwork;
    use wl_05_protocol_engine::{InMemoryNetwork, SessionState};
    use wl_06_peer_service::{PeerService, PeerServiceConfig};

    use crate::support::eventually;

    struct Network {
        net: Arc<InMemoryNetwork>,
        dht: Arc<InMemoryDhtNetwork>,
        seed: Option<PeerAddress>,
    }

    impl Network {
        fn new() -> Self {
            Self {
                net: InMemoryNetwork::new(),
                dht: InMemoryDhtNetwork::new(),
                seed: None,
            }
        }

        /// Add a peer; the first one becomes the seed of the rest.
        async fn join(&mut self, seed: u8, capabilities: &[&str]) -> Arc<PeerService> {
            let mut config = PeerServiceConfig::for_testing();
            config.engine.session = config.engine.session.with_capabilities(capabilities.iter().copied());
            let peer = PeerService::new(
                Arc::new(IdentityKeyPair::from_seed([seed; 32])),
                PeerAddress::new(format!("mem://peer-{seed}")),
                config,
                self.net.clone(),
                self.dht.clone(),
                Arc::new(SystemTimeSource::new()),
            );
            self.net.register(peer.address().clone(), &peer);
            self.dht.register(peer.address().clone(), &peer);
            match &self.seed {
                Some(seed) => {
                    peer.bootstrap(std::slice::from_ref(seed)).await.unwrap();
                }
                None => self.seed = Some(peer.address().clone()),
            }
            peer
        }
    }

    fn owned(capabilities: &[&str]) -> Vec<String> {
        capabilities.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_every_peer_reaches_every_other_by_id() {
        let mut network = Network::new();
        let mut peers = Vec::new();
        for seed in 1..=5 {
            peers.push(network.join(seed, &[]).await);
        }
        for peer in &peers {
            peer.register_self(&[]).await.unwrap();
        }

        let delivered = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        for peer in &peers {
            let counter = delivered.clone();
            peer.register_handler(MessageType::Data, move |_: &wl_05_protocol_engine::DecodedMessage| {
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            });
        }

        let last = peers.len() - 1;
        for (index, peer) in peers.iter().enumerate() {
            let next = &peers[if index == last { 0 } else { index + 1 }];
            peer.send(next.local_id(), MessageType::Data, vec![index as u8])
                .await
                .unwrap();
        }

        assert!(eventually(|| delivered.load(std::sync::atomic::Ordering::Relaxed) == peers.len()).await);
        for (index, peer) in peers.iter().enumerate() {
            let next = &peers[if index == last { 0 } else { index + 1 }];
            assert_eq!(peer.get_session_state(&next.local_id()), Some(SessionState::Ready));
        }
    }

    #[tokio::test]
    async fn test_capability_lookup_then_extension_message() {
        let mut network = Network::new();
        let _seed = network.join(1, &[]).await;
        let server = network.join(2, &["ext:files"]).await;
        let client = network.join(3, &["ext:files"]).await;
        let bystander = network.join(4, &[]).await;

        server.register_self(&owned(&["ext:files"])).await.unwrap();
        client.register_self(&owned(&["ext:files"])).await.unwrap();
        bystander.register_self(&[]).await.unwrap();

        let server_id = server.local_id().to_hex();
        let found = client
            .dht_find_entity_with_capability(&server_id, "ext:files")
            .await
            .unwrap()
            .expect("file server registered");
        assert_eq!(found.addresses, vec![server.address().clone()]);
        assert!(client
            .dht_find_entity_with_capability(&bystander.local_id().to_hex(), "ext:files")
            .await
            .unwrap()
            .is_none());

        let files = MessageType::ext("files").unwrap();
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = received.clone();
        server.register_handler(files.clone(), move |m: &wl_05_protocol_engine::DecodedMessage| {
            sink.lock().push(m.data.clone());
        });

        client
            .send(server.local_id(), files.clone(), b"GET /readme".to_vec())
            .await
            .unwrap();
        assert!(eventually(|| received.lock().len() == 1).await);
        assert_eq!(received.lock()[0], b"GET /readme");

        // The bystander never negotiated the extension.
        assert!(client
            .send(bystander.local_id(), files, b"GET /readme".to_vec())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_departed_peer_becomes_unreachable() {
        let mut network = Network::new();
        let _seed = network.join(1, &[]).await;
        let alice = network.join(2, &[]).await;
        let bob = network.join(3, &[]).await;
        alice.register_self(&[]).await.unwrap();
        bob.register_self(&[]).await.unwrap();

        alice
            .send(bob.local_id(), MessageType::Data, vec![1])
            .await
            .unwrap();
        alice.teardown(bob.local_id()).await.unwrap();

        network.net.set_offline(bob.address(), true);
        let err = alice
            .send(bob.local_id(), MessageType::Data, vec![2])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            shared_types::SendError::Transport(shared_types::TransportError::Unreachable(_))
        ));
    }
}
