//! Batch processing pipeline components.
//!
//! - **hash**: BLAKE3 content hashes, the dedup key
//! - **dedup**: per-session content cache with per-hash claims
//! - **pool**: bounded worker pool
//! - **aggregate**: order-preserving result buffer
//! - **workspace**: on-disk layout and temp-file guards
//! - **discovery**: find files in a directory for local batches
//! - **ingest**: orchestrates a batch end to end

pub mod aggregate;
pub mod dedup;
pub mod discovery;
pub mod hash;
pub mod ingest;
pub mod pool;
pub mod workspace;

// Re-exports for convenient access
pub use aggregate::ResultAggregator;
pub use dedup::{DedupCache, DedupClaim};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use hash::Hasher;
pub use ingest::{IngestOptions, Ingestor, ItemCallback};
pub use pool::{Completion, WorkerPool};
pub use workspace::{EntryDirs, PendingOutput, StagedInput, Workspace};
