//! # Bootstrap Joins the Routing Table
//!
//! A node that knows only a seed's address joins the DHT. One PING round
//! trip is enough for each side to hold the other in its routing table.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared_crypto::IdentityKeyPair;
    use shared_types::{DhtError, PeerAddress, SystemTimeSource, TimeSource};
    use wl_01_dht::{dht_key, DhtConfig, DhtNode, DhtValue, InMemoryDhtNetwork};

    fn dht_node(network: &Arc<InMemoryDhtNetwork>, seed: u8) -> Arc<DhtNode> {
        let node = DhtNode::new(
            Arc::new(IdentityKeyPair::from_seed([seed; 32])),
            PeerAddress::new(format!("mem://dht-{seed}")),
            DhtConfig::for_testing(),
            network.clone(),
            Arc::new(SystemTimeSource::new()),
        );
        network.register(node.address().clone(), &node);
        node
    }

    #[tokio::test]
    async fn test_bootstrap_adds_seed_to_routing_table() {
        let network = InMemoryDhtNetwork::new();
        let seed = dht_node(&network, 1);
        let joiner = dht_node(&network, 2);
        assert!(joiner.routing_table().is_empty());

        let reached = joiner.bootstrap(&[seed.address().clone()]).await.unwrap();

        assert_eq!(reached, 1);
        let known = joiner.routing_table().get(&seed.node_id()).unwrap();
        assert_eq!(&known.address, seed.address());
        // The seed learns the joiner from the same round trip.
        assert!(seed.routing_table().get(&joiner.node_id()).is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_without_live_seed_fails() {
        let network = InMemoryDhtNetwork::new();
        let joiner = dht_node(&network, 2);

        let err = joiner
            .bootstrap(&[PeerAddress::new("mem://nobody")])
            .await
            .unwrap_err();
        assert_eq!(err, DhtError::BootstrapFailed);

        let seed = dht_node(&network, 1);
        network.set_offline(seed.address(), true);
        let err = joiner.bootstrap(&[seed.address().clone()]).await.unwrap_err();
        assert_eq!(err, DhtError::BootstrapFailed);
    }

    #[tokio::test]
    async fn test_joined_nodes_discover_each_other_through_seed() {
        let network = InMemoryDhtNetwork::new();
        let seed = dht_node(&network, 1);
        let first = dht_node(&network, 2);
        let second = dht_node(&network, 3);

        first.bootstrap(&[seed.address().clone()]).await.unwrap();
        second.bootstrap(&[seed.address().clone()]).await.unwrap();

        let closest = second.find_node(&first.node_id()).await.unwrap();
        assert!(closest.iter().any(|node| node.node_id == first.node_id()));
    }

    #[tokio::test]
    async fn test_value_stored_after_bootstrap_is_found_elsewhere() {
        let network = InMemoryDhtNetwork::new();
        let seed = dht_node(&network, 1);
        let publisher = dht_node(&network, 2);
        let reader = dht_node(&network, 3);
        publisher.bootstrap(&[seed.address().clone()]).await.unwrap();
        reader.bootstrap(&[seed.address().clone()]).await.unwrap();

        let identity = IdentityKeyPair::from_seed([2; 32]);
        let mut value = DhtValue {
            entity_id: "sensor-17".into(),
            addresses: vec![publisher.address().clone()],
            public_key: identity.public_key(),
            capabilities: vec!["telemetry".into()],
            last_seen: SystemTimeSource::new().now(),
            ttl_secs: 600,
            signature: None,
        };
        value.sign(&identity).unwrap();

        let key = dht_key("sensor-17", "telemetry");
        assert!(publisher.store(key, value.clone()).await.unwrap() >= 1);

        let found = reader.find_value(&key).await.unwrap().unwrap();
        assert_eq!(found.entity_id, "sensor-17");
        assert_eq!(found.addresses, value.addresses);
        assert!(found.verify());
    }
}
