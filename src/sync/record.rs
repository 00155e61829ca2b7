//! The syncer's view of a file on the remote host.

use super::digest::ContentDigest;
use crate::paths::RemotePath;

/// Printed by the digest query when the remote file is absent.
pub const NOT_EXISTS: &str = "not_exists";

/// Shell command that prints `<hex>  <path>` or [`NOT_EXISTS`].
pub fn digest_query(path: &RemotePath) -> String {
    let quoted = path.quoted();
    format!(
        "if [ -f {q} ]; then sha256sum {q}; else echo {sentinel}; fi",
        q = quoted,
        sentinel = NOT_EXISTS
    )
}

/// Existence and digest of a remote path, as reported just now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRecord {
    pub path: RemotePath,
    pub exists: bool,
    pub digest: Option<String>,
}

impl RemoteFileRecord {
    /// Interpret the output of [`digest_query`].
    pub fn parse(path: RemotePath, output: &str) -> Self {
        let first = output.lines().map(str::trim).find(|l| !l.is_empty());
        match first {
            None => Self::absent(path),
            Some(line) if line == NOT_EXISTS => Self::absent(path),
            Some(line) => {
                let digest = line
                    .split_whitespace()
                    .next()
                    .map(|hex| hex.trim_start_matches('\\').to_ascii_lowercase());
                Self {
                    path,
                    exists: true,
                    digest,
                }
            }
        }
    }

    fn absent(path: RemotePath) -> Self {
        Self {
            path,
            exists: false,
            digest: None,
        }
    }

    /// Whether the remote file holds exactly the bytes behind `digest`.
    pub fn matches(&self, digest: &ContentDigest) -> bool {
        self.exists && self.digest.as_deref() == Some(digest.as_str())
    }
}
