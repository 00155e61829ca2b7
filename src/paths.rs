//! Remote path canonicalization and shell quoting.
//!
//! The remote shell expands `~` but the binary transfer path does not, so
//! every remote path is resolved against the remote home directory exactly
//! once, here, before it reaches either side.

use std::fmt;

use crate::error::RemoteBuildError;
use crate::Result;

/// A remote path with any home-directory shorthand already expanded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    /// Resolve `raw` against the remote `home` directory.
    ///
    /// `~` and `~/rest` are expanded. `~user` forms are rejected since the
    /// other user's home cannot be known without asking the remote side.
    pub fn resolve(raw: &str, home: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RemoteBuildError::InvalidPath("empty remote path".into()));
        }

        let home = home.trim_end_matches('/');
        let resolved = if raw == "~" {
            home.to_string()
        } else if let Some(rest) = raw.strip_prefix("~/") {
            format!("{}/{}", home, rest)
        } else if raw.starts_with('~') {
            return Err(RemoteBuildError::InvalidPath(format!(
                "unsupported home shorthand in '{}'",
                raw
            )));
        } else {
            raw.to_string()
        };

        if resolved.is_empty() {
            return Err(RemoteBuildError::InvalidPath(format!(
                "'{}' resolved to an empty path",
                raw
            )));
        }

        Ok(Self(resolved))
    }

    /// Wrap a path that is already concrete.
    ///
    /// Fails if the path still carries a home shorthand.
    pub fn concrete(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if needs_home(&raw) {
            return Err(RemoteBuildError::InvalidPath(format!(
                "'{}' must be resolved against the remote home first",
                raw
            )));
        }
        if raw.is_empty() {
            return Err(RemoteBuildError::InvalidPath("empty remote path".into()));
        }
        Ok(Self(raw))
    }

    /// Append a file name to this directory path.
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_start_matches('/');
        if self.0.ends_with('/') {
            Self(format!("{}{}", self.0, name))
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0)
    }

    /// The path quoted for use in a shell command.
    pub fn quoted(&self) -> String {
        quote(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `raw` starts with a home-directory shorthand.
pub fn needs_home(raw: &str) -> bool {
    raw.trim_start().starts_with('~')
}

/// Single-quote a string for a POSIX shell.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Quote a directory for `cd`, keeping a leading `~/` outside the quotes so
/// the remote shell still expands it.
pub fn quote_dir(dir: &str) -> String {
    if dir == "~" {
        return "~".to_string();
    }
    match dir.strip_prefix("~/") {
        Some("") => "~/".to_string(),
        Some(rest) => format!("~/{}", quote(rest)),
        None => quote(dir),
    }
}
