//! Command-line interface for remote-build.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Tag of the image to build.
    pub image_tag: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Remote host (overrides config file).
    pub host: Option<String>,
    /// Remote user (overrides config file).
    pub user: Option<String>,
    /// SSH port (overrides config file).
    pub port: Option<u16>,
    /// Private key file (overrides config file).
    pub identity_file: Option<String>,
    /// Per-command timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Do not commit and push the local repository.
    pub skip_push: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('H') | Long("host") => {
                result.host = Some(parser.value()?.parse()?);
            }
            Short('u') | Long("user") => {
                result.user = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('i') | Long("identity") => {
                result.identity_file = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout_secs = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Long("skip-push") => {
                result.skip_push = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) if result.image_tag.is_none() => {
                result.image_tag = Some(val.string()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if result.image_tag.is_none() && !result.help && !result.version {
        return Err(ArgsError::MissingImageTag);
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"remote-build {version}
Build a container image on a remote host and compile an action inside it

USAGE:
    remote-build [OPTIONS] <IMAGE_TAG>

ARGS:
    <IMAGE_TAG>             Tag of the docker image to build

OPTIONS:
    -c, --config <FILE>     Path to configuration file (JSON)
    -H, --host <HOST>       Remote host
    -u, --user <USER>       Remote user
    -p, --port <PORT>       SSH port [default: 22]
    -i, --identity <FILE>   Private key for SSH
    -t, --timeout <SECS>    Per-command timeout (default: none)
        --skip-push         Do not commit and push the local repository
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    REMOTE_BUILD_HOST       Remote host (overrides config)
    REMOTE_BUILD_USER       Remote user (overrides config)
    REMOTE_BUILD_PORT       SSH port (overrides config)
    REMOTE_BUILD_IDENTITY   Private key (overrides config)
    REMOTE_BUILD_LOG_LEVEL  Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Build with settings from a config file
    remote-build -c remote-build.json runtime:latest

    # Override the host and skip the local push
    remote-build -c remote-build.json -H 10.0.0.5 --skip-push runtime:dev
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("remote-build {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid value for an option.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// The image tag was not given.
    MissingImageTag,
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::MissingImageTag => write!(f, "missing required argument <IMAGE_TAG>"),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("remote-build")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_tag_only() {
        let result = parse_args_from(args(&["mn2"])).unwrap();
        assert_eq!(result.image_tag.as_deref(), Some("mn2"));
        assert!(result.host.is_none());
        assert!(!result.skip_push);
    }

    #[test]
    fn test_missing_tag() {
        let result = parse_args_from(args(&[]));
        assert!(matches!(result, Err(ArgsError::MissingImageTag)));
    }

    #[test]
    fn test_help_without_tag() {
        let result = parse_args_from(args(&["-h"])).unwrap();
        assert!(result.help);

        let result = parse_args_from(args(&["--help"])).unwrap();
        assert!(result.help);
    }

    #[test]
    fn test_version_flag() {
        let result = parse_args_from(args(&["-V"])).unwrap();
        assert!(result.version);
    }

    #[test]
    fn test_host_user_port() {
        let result =
            parse_args_from(args(&["-H", "10.0.0.5", "-u", "ci", "-p", "2222", "tag"])).unwrap();
        assert_eq!(result.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(result.user.as_deref(), Some("ci"));
        assert_eq!(result.port, Some(2222));
    }

    #[test]
    fn test_long_options() {
        let result = parse_args_from(args(&[
            "--config",
            "/etc/remote-build.json",
            "--identity",
            "~/.ssh/id_ed25519",
            "--timeout",
            "600",
            "--skip-push",
            "tag",
        ]))
        .unwrap();
        assert_eq!(result.config, Some(PathBuf::from("/etc/remote-build.json")));
        assert_eq!(result.identity_file.as_deref(), Some("~/.ssh/id_ed25519"));
        assert_eq!(result.timeout_secs, Some(600));
        assert!(result.skip_push);
    }

    #[test]
    fn test_log_level() {
        let result = parse_args_from(args(&["-l", "debug", "tag"])).unwrap();
        assert_eq!(result.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_invalid_port() {
        let result = parse_args_from(args(&["-p", "invalid", "tag"]));
        assert!(matches!(result, Err(ArgsError::InvalidValue("port", _))));
    }

    #[test]
    fn test_invalid_timeout() {
        let result = parse_args_from(args(&["-t", "soon", "tag"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_second_positional_rejected() {
        let result = parse_args_from(args(&["one", "two"]));
        assert!(matches!(result, Err(ArgsError::UnexpectedArgument(_))));
    }

    #[test]
    fn test_unknown_flag() {
        let result = parse_args_from(args(&["--bogus", "tag"]));
        assert!(matches!(result, Err(ArgsError::Lexopt(_))));
    }
}
