//! Content digests of local files.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::RemoteBuildError;
use crate::Result;

/// Chunk size used when hashing files.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Content digest (SHA-256 lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Hash everything `reader` yields, `chunk_size` bytes at a time.
    pub fn from_reader<R: Read>(mut reader: R, chunk_size: usize) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; chunk_size.max(1)];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
        }
        Ok(ContentDigest(hex::encode(hasher.finalize())))
    }

    /// Hash a file in [`CHUNK_SIZE`] chunks on the blocking pool.
    pub async fn of_file(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            ContentDigest::from_reader(file, CHUNK_SIZE)
        })
        .await??;
        Ok(digest)
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local file together with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    path: PathBuf,
    digest: ContentDigest,
}

impl FileArtifact {
    /// Hash the file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(RemoteBuildError::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let digest = ContentDigest::of_file(&path).await?;
        Ok(Self { path, digest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// File name used for the remote copy.
    pub fn file_name(&self) -> Result<&str> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RemoteBuildError::InvalidPath(format!(
                    "{} has no usable file name",
                    self.path.display()
                ))
            })
    }
}
