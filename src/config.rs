//! Configuration management for remote-build.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::READ_BUFFER_SIZE;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target host.
    pub remote: RemoteSection,
    /// Runtime repository the image is built from.
    pub repository: RepositorySection,
    /// Action packaging, container and download settings.
    pub build: BuildSection,
    /// Command execution settings.
    pub execution: ExecutionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Remote host section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Host name or address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Private key file (`~` is expanded).
    pub identity_file: Option<String>,
    /// Remote home directory. Asked from the remote shell when unset.
    pub home: Option<String>,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            port: 22,
            identity_file: None,
            home: None,
        }
    }
}

/// Repository section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySection {
    /// Clone URL; its last path segment names the remote checkout.
    pub url: String,
    /// Branch that is pushed locally and pulled remotely.
    pub branch: String,
    /// Local checkout. Defaults to the git top level of the working directory.
    pub local_path: Option<PathBuf>,
    /// Directory of the Dockerfile, relative to the repository root.
    pub build_path: String,
    /// Commit and push local changes before building.
    pub push: bool,
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: "main".to_string(),
            local_path: None,
            build_path: ".".to_string(),
            push: true,
        }
    }
}

impl RepositorySection {
    /// Name of the checkout directory on the remote host.
    pub fn name(&self) -> Option<&str> {
        self.url
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
    }
}

/// Build section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Action name passed to the compiler inside the image.
    pub function_name: String,
    /// Local directory holding the action sources.
    pub source_path: Option<PathBuf>,
    /// Remote directory the zipped sources go to. Defaults to `~/<function_name>`.
    pub remote_dir: Option<String>,
    /// Local directory the zip is written to. Defaults to the working directory.
    pub archive_dir: Option<PathBuf>,
    /// Docker CLI invocation on the remote host.
    pub docker: String,
    /// Name of the long-running inspection container.
    pub container_name: String,
    /// Name of the one-shot compile container.
    pub compile_container: String,
    /// Directory inside the container that receives the zip.
    pub container_workdir: String,
    /// Compiled sources inside the compile container.
    pub compiled_sources: String,
    /// File the compile step writes on the remote host.
    pub compile_output: String,
    /// Local directory compiled sources are downloaded into.
    pub download_dir: PathBuf,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            function_name: String::new(),
            source_path: None,
            remote_dir: None,
            archive_dir: None,
            docker: "sudo docker".to_string(),
            container_name: "build_container".to_string(),
            compile_container: "compiled".to_string(),
            container_workdir: "/swiftAction".to_string(),
            compiled_sources: "/swiftAction/action/1/src".to_string(),
            compile_output: "o.zip".to_string(),
            download_dir: PathBuf::from("."),
        }
    }
}

impl BuildSection {
    /// Remote artifact directory, falling back to `~/<function_name>`.
    pub fn remote_dir(&self) -> String {
        self.remote_dir
            .clone()
            .unwrap_or_else(|| format!("~/{}", self.function_name))
    }
}

/// Execution section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Per-command timeout in seconds. Unset means no limit.
    pub timeout_secs: Option<u64>,
    /// Chunk size for stream reads.
    pub read_buffer_size: usize,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

impl ExecutionSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level or filter directive (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup (for testing).
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REMOTE_BUILD_HOST") {
            self.remote.host = host;
        }

        if let Some(user) = lookup("REMOTE_BUILD_USER") {
            self.remote.user = user;
        }

        if let Some(port) = lookup("REMOTE_BUILD_PORT") {
            if let Ok(port) = port.parse() {
                self.remote.port = port;
            }
        }

        if let Some(identity) = lookup("REMOTE_BUILD_IDENTITY") {
            if !identity.is_empty() {
                self.remote.identity_file = Some(identity);
            }
        }

        if let Some(level) = lookup("REMOTE_BUILD_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref host) = args.host {
            self.remote.host = host.clone();
        }

        if let Some(ref user) = args.user {
            self.remote.user = user.clone();
        }

        if let Some(port) = args.port {
            self.remote.port = port;
        }

        if let Some(ref identity) = args.identity_file {
            self.remote.identity_file = Some(identity.clone());
        }

        if let Some(secs) = args.timeout_secs {
            self.execution.timeout_secs = Some(secs);
        }

        if args.skip_push {
            self.repository.push = false;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Check that everything the workflow needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("remote.host", self.remote.host.is_empty()),
            ("remote.user", self.remote.user.is_empty()),
            ("repository.url", self.repository.name().is_none()),
            ("build.function_name", self.build.function_name.is_empty()),
            ("build.source_path", self.build.source_path.is_none()),
        ];
        match required.iter().find(|(_, missing)| *missing) {
            Some((field, _)) => Err(ConfigError::Missing(*field)),
            None => Ok(()),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A required setting is absent.
    Missing(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Missing(field) => write!(f, "missing required setting: {}", field),
        }
    }
}

impl std::error::Error for ConfigError {}
