//! Chunking errors.

use shared_types::ProtocolError;
use thiserror::Error;
use uuid::Uuid;

/// Why a fragment or a whole transfer was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// A chunk's data does not match its checksum. The transfer is aborted.
    #[error("Corrupt chunk {index} of transfer {transfer_id}")]
    CorruptChunk {
        /// Transfer the chunk belongs to
        transfer_id: Uuid,
        /// Position of the chunk
        index: u32,
    },

    /// Chunk headers disagree with each other. The transfer is aborted.
    #[error("Inconsistent chunk metadata: {0}")]
    InconsistentMetadata(String),

    /// All chunks arrived but the joined payload fails its checksum.
    #[error("Payload checksum mismatch for transfer {0}")]
    PayloadChecksumMismatch(Uuid),

    /// Declared chunk count exceeds the limit.
    #[error("Too many chunks: {total} (max {max})")]
    TooManyChunks {
        /// Declared total
        total: u32,
        /// Configured maximum
        max: u32,
    },

    /// Sender already has the maximum number of open transfers.
    #[error("Too many concurrent transfers (max {0})")]
    TooManyTransfers(usize),

    /// Incomplete transfer passed its deadline.
    #[error("Transfer {0} expired")]
    Expired(Uuid),

    /// Transfer already finished or was abandoned.
    #[error("Transfer {0} closed")]
    TransferClosed(Uuid),

    /// Chunk frame failed to parse.
    #[error("Malformed chunk: {0}")]
    Malformed(String),
}

impl From<ChunkError> for ProtocolError {
    fn from(err: ChunkError) -> Self {
        ProtocolError::ChunkRejected(err.to_string())
    }
}
