//! In-process frame network.
//!
//! Each `send` spawns delivery to the engine registered under the target
//! address, so sends never wait on the receiver. Frames can be dropped by
//! a filter to simulate loss, and optionally recorded for inspection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use shared_types::{Envelope, MessageType, PeerAddress, TransportError};
use tracing::trace;

use crate::ports::{FrameHandler, Transport};

type DropFilter = Box<dyn FnMut(&PeerAddress, &Envelope) -> bool + Send>;

/// Shared in-memory network; clone the `Arc` into every engine.
#[derive(Default)]
pub struct InMemoryNetwork {
    endpoints: DashMap<PeerAddress, Weak<dyn FrameHandler>>,
    offline: DashSet<PeerAddress>,
    filter: Mutex<Option<DropFilter>>,
    dropped: AtomicUsize,
    recording: AtomicBool,
    recorded: Mutex<Vec<(PeerAddress, Vec<u8>)>>,
}

impl InMemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `handler` reachable at `address`. Only a weak reference is
    /// kept, so dropping the engine takes it off the network.
    pub fn register<H: FrameHandler + 'static>(&self, address: PeerAddress, handler: &Arc<H>) {
        let handler: Arc<dyn FrameHandler> = handler.clone();
        self.endpoints.insert(address, Arc::downgrade(&handler));
    }

    /// Remove whatever is registered at `address`.
    pub fn unregister(&self, address: &PeerAddress) {
        self.endpoints.remove(address);
    }

    /// Simulate a node going silent (or coming back).
    pub fn set_offline(&self, address: &PeerAddress, offline: bool) {
        if offline {
            self.offline.insert(address.clone());
        } else {
            self.offline.remove(address);
        }
    }

    /// Silently drop every frame for which `filter` returns `true`.
    /// Replaces any previous filter.
    pub fn drop_when<F>(&self, filter: F)
    where
        F: FnMut(&PeerAddress, &Envelope) -> bool + Send + 'static,
    {
        *self.filter.lock() = Some(Box::new(filter));
    }

    /// Drop only the first frame of type `msg_type`.
    pub fn drop_next(&self, msg_type: MessageType) {
        let mut armed = true;
        self.drop_when(move |_, envelope| {
            if armed && envelope.msg_type == msg_type {
                armed = false;
                return true;
            }
            false
        });
    }

    /// Deliver everything again.
    pub fn clear_filter(&self) {
        *self.filter.lock() = None;
    }

    /// Frames dropped by the filter so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Start or stop keeping a copy of every delivered frame.
    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::Relaxed);
    }

    /// Recorded frames addressed to `to`, oldest first.
    pub fn recorded_to(&self, to: &PeerAddress) -> Vec<Vec<u8>> {
        self.recorded
            .lock()
            .iter()
            .filter(|(address, _)| address == to)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    fn should_drop(&self, to: &PeerAddress, frame: &[u8]) -> bool {
        let mut filter = self.filter.lock();
        let Some(filter) = filter.as_mut() else {
            return false;
        };
        match Envelope::from_bytes(frame) {
            Ok(envelope) => filter(to, &envelope),
            Err(_) => false,
        }
    }

    fn resolve(&self, to: &PeerAddress) -> Result<Arc<dyn FrameHandler>, TransportError> {
        if self.offline.contains(to) {
            return Err(TransportError::Unreachable(format!("{to} is offline")));
        }
        self.endpoints
            .get(to)
            .and_then(|h| h.upgrade())
            .ok_or_else(|| TransportError::Unreachable(format!("no node at {to}")))
    }
}

#[async_trait]
impl Transport for InMemoryNetwork {
    async fn send(&self, to: &PeerAddress, frame: Vec<u8>) -> Result<(), TransportError> {
        let handler = self.resolve(to)?;
        if self.should_drop(to, &frame) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(to = %to, "in-memory frame dropped");
            return Ok(());
        }
        if self.recording.load(Ordering::Relaxed) {
            self.recorded.lock().push((to.clone(), frame.clone()));
        }

        trace!(to = %to, bytes = frame.len(), "in-memory frame");
        tokio::spawn(async move {
            handler.handle_frame(frame).await;
        });
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNetwork")
            .field("endpoints", &self.endpoints.len())
            .field("offline", &self.offline.len())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}
