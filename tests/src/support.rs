//! In-memory meshes shared by the integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_crypto::IdentityKeyPair;
use shared_types::{MessageType, PeerAddress, PeerId, SystemTimeSource};
use wl_05_protocol_engine::{
    DecodedMessage, EngineConfig, InMemoryNetwork, SessionProtocolEngine, StaticAddressBook,
    Transport,
};

/// A protocol engine with the identity it runs under.
pub struct EngineNode {
    pub engine: Arc<SessionProtocolEngine>,
    pub id: PeerId,
    pub address: PeerAddress,
}

/// Engines sharing one in-memory network and one static address book.
pub struct EngineMesh {
    pub net: Arc<InMemoryNetwork>,
    pub book: Arc<StaticAddressBook>,
}

impl EngineMesh {
    pub fn new() -> Self {
        Self {
            net: InMemoryNetwork::new(),
            book: Arc::new(StaticAddressBook::new()),
        }
    }

    /// Node sending through the mesh network.
    pub fn node(&self, seed: u8, config: EngineConfig) -> EngineNode {
        self.node_via(seed, config, self.net.clone())
    }

    /// Node sending through `transport`, still reachable on the mesh.
    pub fn node_via(&self, seed: u8, config: EngineConfig, transport: Arc<dyn Transport>) -> EngineNode {
        let identity = Arc::new(IdentityKeyPair::from_seed([seed; 32]));
        let id = PeerId::from_public_key(&identity.public_key());
        let address = PeerAddress::new(format!("mem://engine-{seed}"));
        let engine = SessionProtocolEngine::new(
            identity,
            config,
            transport,
            self.book.clone(),
            Arc::new(SystemTimeSource::new()),
        );
        self.net.register(address.clone(), &engine);
        self.book.insert(id, address.clone());
        EngineNode {
            engine,
            id,
            address,
        }
    }
}

impl Default for EngineMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every message of `msg_type` delivered to `engine`.
pub fn inbox(
    engine: &SessionProtocolEngine,
    msg_type: MessageType,
) -> Arc<Mutex<Vec<DecodedMessage>>> {
    let inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = inbox.clone();
    engine.register_handler(msg_type, move |message: &DecodedMessage| {
        sink.lock().push(message.clone());
    });
    inbox
}

/// Poll `condition` for up to two seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
