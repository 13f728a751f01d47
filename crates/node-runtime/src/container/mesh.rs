//! # Simulated Mesh
//!
//! Peer services wired over the in-memory transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use shared_crypto::IdentityKeyPair;
use shared_types::{MessageType, PeerAddress, SystemTimeSource};
use tracing::{debug, info, warn};
use wl_01_dht::InMemoryDhtNetwork;
use wl_05_protocol_engine::{DecodedMessage, InMemoryNetwork};
use wl_06_peer_service::{PeerService, ServiceHandle};

use super::config::NodeConfig;

/// Capability every simulated peer registers.
pub const CHAT_CAPABILITY: &str = "chat";

/// Outcome of [`SimulatedMesh::run_workload`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    /// Peers that registered themselves in the DHT
    pub registered: usize,
    /// Application messages accepted by `send`
    pub sent: usize,
    /// Chunks the large payload was split into
    pub chunks: u32,
    /// Messages that reached a handler
    pub delivered: usize,
}

/// A set of peer services sharing in-memory networks.
pub struct SimulatedMesh {
    net: Arc<InMemoryNetwork>,
    dht_net: Arc<InMemoryDhtNetwork>,
    peers: Vec<Arc<PeerService>>,
    handles: Vec<ServiceHandle>,
    delivered: Arc<AtomicUsize>,
    config: NodeConfig,
}

impl SimulatedMesh {
    /// Create `config.simulation.nodes` peers and register them on both
    /// networks. Nothing runs yet.
    pub fn new(config: NodeConfig) -> Self {
        let net = InMemoryNetwork::new();
        let dht_net = InMemoryDhtNetwork::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let peers: Vec<_> = (0..config.simulation.nodes)
            .map(|index| {
                let identity = Arc::new(IdentityKeyPair::generate());
                let address = PeerAddress::new(format!("mem://node-{index}"));
                let peer = PeerService::new(
                    identity,
                    address.clone(),
                    config.peer.clone(),
                    net.clone(),
                    dht_net.clone(),
                    Arc::new(SystemTimeSource::new()),
                );
                net.register(address.clone(), &peer);
                dht_net.register(address, &peer);

                let counter = delivered.clone();
                peer.register_handler(MessageType::Data, move |message: &DecodedMessage| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    info!(
                        from = ?message.sender,
                        bytes = message.data.len(),
                        chunked = message.transfer_id.is_some(),
                        "message delivered"
                    );
                });
                peer
            })
            .collect();

        Self {
            net,
            dht_net,
            peers,
            handles: Vec::new(),
            delivered,
            config,
        }
    }

    /// Peers in creation order; index 0 is the seed.
    pub fn peers(&self) -> &[Arc<PeerService>] {
        &self.peers
    }

    /// Messages delivered to any handler so far.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Start every peer's background loops and bootstrap all but the seed
    /// from the seed.
    pub async fn start(&mut self) -> Result<()> {
        let Some(seed) = self.peers.first().map(|p| p.address().clone()) else {
            bail!("mesh has no peers");
        };
        self.handles = self.peers.iter().map(|peer| peer.start()).collect();

        for peer in self.peers.iter().skip(1) {
            peer.bootstrap(std::slice::from_ref(&seed))
                .await
                .with_context(|| format!("bootstrap of {} failed", peer.address()))?;
        }
        info!(
            peers = self.peers.len(),
            dht_endpoints = self.dht_net.len(),
            "mesh bootstrapped"
        );
        Ok(())
    }

    /// Register every peer, then send one message from the seed to every
    /// other peer and one large payload to the second peer.
    pub async fn run_workload(&self) -> Result<WorkloadReport> {
        let mut report = WorkloadReport::default();
        let capabilities = vec![CHAT_CAPABILITY.to_string()];
        for peer in &self.peers {
            match peer.register_self(&capabilities).await {
                Ok(_) => report.registered += 1,
                Err(err) => warn!(address = %peer.address(), error = %err, "registration failed"),
            }
        }

        let (seed, others) = match self.peers.split_first() {
            Some(split) => split,
            None => bail!("mesh has no peers"),
        };
        for (index, peer) in others.iter().enumerate() {
            let lookup = seed
                .dht_find_entity_with_capability(&peer.local_id().to_hex(), CHAT_CAPABILITY)
                .await?;
            if lookup.is_none() {
                warn!(address = %peer.address(), "peer not discoverable");
                continue;
            }
            let greeting = format!("hello node-{}", index + 1).into_bytes();
            seed.send(peer.local_id(), MessageType::Data, greeting)
                .await
                .with_context(|| format!("send to {} failed", peer.address()))?;
            report.sent += 1;
        }

        if let Some(target) = others.first() {
            let payload: Vec<u8> = (0..self.config.simulation.large_payload_bytes)
                .map(|i| (i % 251) as u8)
                .collect();
            let receipt = seed
                .send(target.local_id(), MessageType::Data, payload)
                .await
                .context("large send failed")?;
            report.sent += 1;
            report.chunks = receipt.chunks;
        }

        report.delivered = self.wait_for_deliveries(report.sent).await;
        info!(?report, dropped = self.net.dropped(), "workload finished");
        Ok(report)
    }

    async fn wait_for_deliveries(&self, expected: usize) -> usize {
        let deadline = self.config.peer.engine.send_timeout;
        let wait = async {
            while self.delivered() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            warn!(expected, delivered = self.delivered(), "not every message arrived");
        }
        self.delivered()
    }

    /// Tear down sessions and stop every background loop.
    pub async fn shutdown(&mut self) {
        if let Some((seed, others)) = self.peers.split_first() {
            for peer in others {
                if let Err(err) = seed.teardown(peer.local_id()).await {
                    debug!(address = %peer.address(), error = %err, "no session to close");
                }
            }
        }
        for handle in self.handles.drain(..) {
            handle.shutdown(Duration::from_secs(2)).await;
        }
        info!("mesh stopped");
    }
}

impl std::fmt::Debug for SimulatedMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedMesh")
            .field("peers", &self.peers.len())
            .field("running", &self.handles.len())
            .field("delivered", &self.delivered())
            .finish_non_exhaustive()
    }
}
