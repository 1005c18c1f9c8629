//! Command line and environment configuration.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use clap::Parser;

use crate::logging::LogConfig;
use crate::supervisor::DEFAULT_SCAN_INTERVAL;
use crate::Error;

const AFTER_HELP: &str = "\
Every line written to a named pipe in TARGET_DIR is printed to stdout,
prefixed with the name of the pipe:

  $ mkfifo /pipes/web && echo 'GET /' > /pipes/web
  web GET /

Environment Variables:
   NAFDER_DEBUG=true     : Print debug messages (=--debug option)
   NAFDER_LOGPREFIX=name : Prefix of nafder's own messages (default: nafder)
   NAFDER_INTERVAL=secs  : Rescan interval in seconds (default: 30)
   NAFDER_LOG=filter     : env_logger filter overriding the log level";

// `--version` also names the commit (set `NAFDER_COMMIT` when building) and
// where the source lives.
fn long_version() -> &'static str {
    static LONG_VERSION: OnceLock<String> = OnceLock::new();

    LONG_VERSION.get_or_init(|| {
        format!(
            "{}\nCommit {}\nSource {}",
            env!("CARGO_PKG_VERSION"),
            option_env!("NAFDER_COMMIT").unwrap_or("unknown"),
            env!("CARGO_PKG_REPOSITORY"),
        )
    })
}

/// Identifies the logs of a container running several applications, each
/// writing to its own named pipe.
#[derive(Clone, Debug, Parser)]
#[command(name = "nafder", version, long_version = long_version(), after_help = AFTER_HELP)]
pub struct Cli {
    /// Directory holding the named pipes
    #[arg(value_name = "TARGET_DIR")]
    pub target_dir: PathBuf,

    /// Copy logs to the specified file
    #[arg(short = 'c', long = "copy", value_name = "FILE")]
    pub copy: Option<PathBuf>,

    /// Output timestamps
    #[arg(short = 't', long = "time")]
    pub time: bool,

    /// Print debug messages
    #[arg(short = 'd', long = "debug", env = "NAFDER_DEBUG")]
    pub debug: bool,

    /// Prefix of diagnostic messages
    #[arg(long = "log-prefix", env = "NAFDER_LOGPREFIX", default_value = "nafder")]
    pub log_prefix: String,

    /// Seconds between two full rescans of TARGET_DIR
    #[arg(
        short = 'i',
        long = "interval",
        env = "NAFDER_INTERVAL",
        value_name = "SECS",
        default_value_t = DEFAULT_SCAN_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,
}

/// Validated settings the daemon runs with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Canonical path of the watched directory.
    pub target_dir: PathBuf,
    pub copy: Option<PathBuf>,
    pub interval: Duration,
    pub log: LogConfig,
}

impl Cli {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            prefix: self.log_prefix.clone(),
            timestamp: self.time,
            debug: self.debug,
        }
    }

    /// Checks the target directory and resolves it to a canonical path.
    pub fn into_config(self) -> Result<Config, Error> {
        let target_dir = target_dir(&self.target_dir)?;

        Ok(Config {
            target_dir,
            log: self.log_config(),
            copy: self.copy,
            interval: Duration::from_secs(self.interval),
        })
    }
}

fn target_dir(path: &Path) -> Result<PathBuf, Error> {
    match path.metadata() {
        Ok(meta) if meta.is_dir() => {
            path.canonicalize().map_err(|_| Error::TargetDir(path.to_path_buf()))
        }
        _ => Err(Error::TargetDir(path.to_path_buf())),
    }
}

/// Opens the `--copy` file for appending, creating it if needed.
pub fn open_copy(path: impl AsRef<Path>) -> io::Result<File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o660)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn test_cli_asserts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "nafder", "-c", "/tmp/copy.log", "-t", "-d", "--interval", "5", "/pipes",
        ])
        .unwrap();

        assert_eq!(cli.target_dir, PathBuf::from("/pipes"));
        assert_eq!(cli.copy, Some(PathBuf::from("/tmp/copy.log")));
        assert!(cli.time);
        assert!(cli.debug);
        assert_eq!(cli.interval, 5);
    }

    #[test]
    fn test_parse_long_flags() {
        let cli = Cli::try_parse_from([
            "nafder", "--copy", "out.log", "--time", "--log-prefix", "side", "/pipes",
        ])
        .unwrap();

        assert_eq!(cli.copy, Some(PathBuf::from("out.log")));
        assert!(cli.time);
        assert_eq!(cli.log_config().prefix, "side");
    }

    #[test]
    fn test_missing_target() {
        let err = Cli::try_parse_from(["nafder"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Cli::try_parse_from(["nafder", "-i", "0", "/pipes"]).is_err());
    }

    #[test]
    fn test_help_and_version() {
        let err = Cli::try_parse_from(["nafder", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = Cli::try_parse_from(["nafder", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_long_version() {
        let version = Cli::command().render_long_version();
        assert!(version.starts_with(&format!("nafder {}\n", env!("CARGO_PKG_VERSION"))));
        assert!(version.contains("\nCommit "));
        assert!(version.contains("\nSource https://github.com/t-matsuo/nafder"));
    }

    #[test]
    fn test_into_config() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(["nafder", tmp_dir.path().to_str().unwrap()]).unwrap();

        let config = cli.into_config().unwrap();
        assert_eq!(config.target_dir, tmp_dir.path().canonicalize().unwrap());
        assert_eq!(config.interval, DEFAULT_SCAN_INTERVAL);
        assert_eq!(config.copy, None);
    }

    #[test]
    fn test_into_config_rejects_file_and_missing() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let file = tmp_dir.path().join("file");
        std::fs::write(&file, b"").unwrap();

        for target in [file, tmp_dir.path().join("missing")] {
            let cli = Cli::try_parse_from([OsStr::new("nafder"), target.as_os_str()]).unwrap();
            assert!(matches!(cli.into_config(), Err(Error::TargetDir(_))));
        }
    }

    #[test]
    fn test_open_copy_appends() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("copy.log");
        std::fs::write(&path, b"first\n").unwrap();

        {
            use std::io::Write;
            let mut file = open_copy(&path).unwrap();
            file.write_all(b"second\n").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
