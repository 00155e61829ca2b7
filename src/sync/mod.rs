//! Content-addressed file synchronization.
//!
//! Uploads compare the SHA-256 of the local file with the digest the remote
//! side reports for the target path and only move bytes when they differ.
//! Nothing is cached between calls; the remote digest is asked for every
//! time.

mod digest;
mod record;
mod syncer;

pub use digest::{ContentDigest, FileArtifact, CHUNK_SIZE};
pub use record::{digest_query, RemoteFileRecord, NOT_EXISTS};
pub use syncer::{ContentSyncer, SyncOutcome};
