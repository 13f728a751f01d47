//! The chunk manager service.

use std::sync::Arc;

use dashmap::DashMap;
use shared_types::{MessageType, PeerId, TimeSource, Timestamp};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{split_payload, ChunkAssembly, ChunkConfig, ChunkError, ChunkFrame, Reassembled};

type TransferKey = (PeerId, Uuid);
type Waiter = oneshot::Sender<Result<Reassembled, ChunkError>>;

/// Result of feeding one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkProgress {
    /// Transfer still missing chunks.
    Pending {
        /// Chunks held
        received: u32,
        /// Chunks expected
        total: u32,
    },
    /// Last chunk arrived and the payload verified.
    Complete(Reassembled),
    /// Chunk for a transfer that already finished, failed or expired.
    Discarded,
}

/// How a transfer ended, remembered so stragglers are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferEnd {
    Completed,
    Aborted,
    Expired,
}

/// Splits outbound payloads and reassembles inbound ones.
///
/// # Concurrency
///
/// Assemblies are keyed by (sender, transfer id) in a sharded map, so
/// chunks from unrelated senders never wait on each other.
pub struct ChunkManager {
    assemblies: DashMap<TransferKey, ChunkAssembly>,
    tombstones: DashMap<TransferKey, (TransferEnd, Timestamp)>,
    waiters: DashMap<TransferKey, Vec<Waiter>>,
    config: ChunkConfig,
    time_source: Arc<dyn TimeSource>,
}

impl ChunkManager {
    /// Create a manager reading time from `time_source`.
    pub fn new(config: ChunkConfig, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            assemblies: DashMap::new(),
            tombstones: DashMap::new(),
            waiters: DashMap::new(),
            config,
            time_source,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// `true` if a payload of `len` bytes must go out in chunks.
    pub fn needs_split(&self, len: usize) -> bool {
        self.config.needs_split(len)
    }

    /// Split `payload` into frames of at most `threshold` bytes.
    pub fn split(&self, msg_type: &MessageType, payload: &[u8]) -> Result<Vec<ChunkFrame>, ChunkError> {
        split_payload(
            msg_type,
            payload,
            self.config.threshold,
            self.config.max_total_chunks,
        )
    }

    /// Feed one chunk from `sender`.
    ///
    /// # Errors
    ///
    /// Any error aborts the transfer: its buffer is dropped, waiters are
    /// told, and later chunks for it are discarded.
    pub fn accept(&self, sender: PeerId, frame: ChunkFrame) -> Result<ChunkProgress, ChunkError> {
        let now = self.time_source.now();
        let key = (sender, frame.transfer_id);

        if self.tombstones.contains_key(&key) {
            debug!(peer = ?sender, transfer = %frame.transfer_id, index = frame.index, "chunk for closed transfer discarded");
            return Ok(ChunkProgress::Discarded);
        }

        let expired = self
            .assemblies
            .get(&key)
            .is_some_and(|a| a.is_expired(now));
        if expired {
            self.assemblies.remove(&key);
            self.close(key, TransferEnd::Expired, Err(ChunkError::Expired(key.1)), now);
            return Ok(ChunkProgress::Discarded);
        }

        match self.ingest(key, frame, now) {
            Ok(progress) => Ok(progress),
            Err(err) => {
                warn!(peer = ?sender, transfer = %key.1, error = %err, "transfer aborted");
                self.assemblies.remove(&key);
                self.close(key, TransferEnd::Aborted, Err(err.clone()), now);
                Err(err)
            }
        }
    }

    fn ingest(&self, key: TransferKey, frame: ChunkFrame, now: Timestamp) -> Result<ChunkProgress, ChunkError> {
        frame.check_bounds(self.config.max_total_chunks)?;
        frame.verify_checksum()?;

        if !self.assemblies.contains_key(&key)
            && self.transfers_from(&key.0) >= self.config.max_concurrent_transfers
        {
            return Err(ChunkError::TooManyTransfers(self.config.max_concurrent_transfers));
        }

        let (received, total, complete) = {
            let deadline = now.saturating_add(self.config.assembly_timeout);
            let mut assembly = self
                .assemblies
                .entry(key)
                .or_insert_with(|| ChunkAssembly::new(&frame, deadline));
            assembly.insert(frame)?;
            (assembly.received(), assembly.total(), assembly.is_complete())
        };
        if !complete {
            return Ok(ChunkProgress::Pending { received, total });
        }

        // Lost a race with another completing chunk.
        let Some((_, assembly)) = self.assemblies.remove(&key) else {
            return Ok(ChunkProgress::Discarded);
        };
        let payload = assembly.assemble()?;
        debug!(peer = ?key.0, transfer = %key.1, total, bytes = payload.data.len(), "transfer reassembled");
        self.close(key, TransferEnd::Completed, Ok(payload.clone()), now);
        Ok(ChunkProgress::Complete(payload))
    }

    /// Tombstone `key` and hand `outcome` to anyone waiting on it.
    fn close(
        &self,
        key: TransferKey,
        end: TransferEnd,
        outcome: Result<Reassembled, ChunkError>,
        now: Timestamp,
    ) {
        self.tombstones.insert(key, (end, now));
        if let Some((_, waiters)) = self.waiters.remove(&key) {
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    /// Wait until the transfer `transfer_id` from `sender` completes.
    ///
    /// Resolves with the payload, or the error that aborted or expired the
    /// transfer. Callers bound the wait with their own timeout.
    ///
    /// # Errors
    ///
    /// `TransferClosed` if the transfer already ended before the call.
    pub async fn wait_for(&self, sender: PeerId, transfer_id: Uuid) -> Result<Reassembled, ChunkError> {
        let key = (sender, transfer_id);
        if self.tombstones.contains_key(&key) {
            return Err(ChunkError::TransferClosed(transfer_id));
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(key).or_default().push(tx);

        // Closed between the check and the push.
        if self.tombstones.contains_key(&key) {
            if let Some((_, waiters)) = self.waiters.remove(&key) {
                for waiter in waiters {
                    let _ = waiter.send(Err(ChunkError::TransferClosed(transfer_id)));
                }
            }
        }
        rx.await
            .unwrap_or(Err(ChunkError::TransferClosed(transfer_id)))
    }

    /// Drop incomplete transfers past their deadline, old tombstones, and
    /// waiters whose caller gave up. Returns how many transfers expired.
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        let expired: Vec<TransferKey> = self
            .assemblies
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();
        for key in &expired {
            if self.assemblies.remove(key).is_some() {
                debug!(peer = ?key.0, transfer = %key.1, "incomplete transfer expired");
                self.close(*key, TransferEnd::Expired, Err(ChunkError::Expired(key.1)), now);
            }
        }

        let ttl = self.config.tombstone_ttl;
        self.tombstones.retain(|_, (_, at)| now.since(*at) < ttl);
        self.waiters.retain(|_, waiters| {
            waiters.retain(|w| !w.is_closed());
            !waiters.is_empty()
        });
        expired.len()
    }

    /// Open transfers from `sender`.
    pub fn transfers_from(&self, sender: &PeerId) -> usize {
        self.assemblies.iter().filter(|e| e.key().0 == *sender).count()
    }

    /// Open transfers from everyone.
    pub fn active_transfers(&self) -> usize {
        self.assemblies.len()
    }

    /// `true` if the transfer finished (any outcome) recently.
    pub fn is_closed(&self, sender: &PeerId, transfer_id: &Uuid) -> bool {
        self.tombstones.contains_key(&(*sender, *transfer_id))
    }

    /// `true` if the transfer completed successfully recently.
    pub fn is_completed(&self, sender: &PeerId, transfer_id: &Uuid) -> bool {
        self.tombstones
            .get(&(*sender, *transfer_id))
            .is_some_and(|t| t.0 == TransferEnd::Completed)
    }
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("assemblies", &self.assemblies.len())
            .field("tombstones", &self.tombstones.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
