//! Diagnostic logging setup.
//!
//! Messages go through the [`log`] facade and are written by `env_logger`:
//! warnings and errors to stderr, everything else to stdout, and all of it to
//! the `--copy` file when one could be opened. Each line reads
//! `[timestamp ][file:line: ]<prefix> <LEVEL> <message>`.

use std::fs::File;
use std::io::{self, Write};

use env_logger::{Builder, Env, Logger, Target};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::sink::TIMESTAMP_FORMAT;

/// Environment variable accepting an `env_logger` filter, e.g. `nafder=trace`.
pub const LOG_FILTER_ENV: &str = "NAFDER_LOG";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogConfig {
    /// Leading tag of every diagnostic line.
    pub prefix: String,
    pub timestamp: bool,
    /// Enables debug messages and caller locations.
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            prefix: "nafder".to_string(),
            timestamp: false,
            debug: false,
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// Renders one diagnostic line, without the trailing newline.
    pub fn render(
        &self,
        timestamp: Option<&str>,
        location: Option<(&str, u32)>,
        level: Level,
        message: &dyn std::fmt::Display,
    ) -> String {
        let mut out = String::new();
        if let Some(ts) = timestamp {
            out.push_str(ts);
            out.push(' ');
        }
        if let Some((file, line)) = location {
            out.push_str(&format!("{}:{}: ", file, line));
        }
        out.push_str(&format!("{} {} {}", self.prefix, level, message));
        out
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn for_level(level: Level) -> Self {
        if level <= Level::Warn {
            Stream::Stderr
        } else {
            Stream::Stdout
        }
    }
}

/// Writes to one console stream and copies everything to an optional mirror
/// file.
struct Tee {
    stream: Stream,
    mirror: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream {
            Stream::Stdout => io::stdout().write_all(buf)?,
            Stream::Stderr => io::stderr().write_all(buf)?,
        }
        if let Some(mirror) = &mut self.mirror {
            // Losing the copy must not silence the console.
            let _ = mirror.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream {
            Stream::Stdout => io::stdout().flush()?,
            Stream::Stderr => io::stderr().flush()?,
        }
        if let Some(mirror) = &mut self.mirror {
            let _ = mirror.flush();
        }
        Ok(())
    }
}

// Sends each record to the logger of its stream.
struct Router {
    out: Logger,
    err: Logger,
}

impl Log for Router {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.out.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        match Stream::for_level(record.level()) {
            Stream::Stdout => self.out.log(record),
            Stream::Stderr => self.err.log(record),
        }
    }

    fn flush(&self) {
        self.out.flush();
        self.err.flush();
    }
}

fn build(config: &LogConfig, tee: Tee) -> Logger {
    let format = config.clone();

    Builder::new()
        .filter_level(config.level())
        .parse_env(Env::new().filter(LOG_FILTER_ENV))
        .format(move |buf, record| {
            let ts = format
                .timestamp
                .then(|| chrono::Local::now().format(TIMESTAMP_FORMAT).to_string());
            let location = match (format.debug, record.file(), record.line()) {
                (true, Some(file), Some(line)) => Some((file, line)),
                _ => None,
            };
            writeln!(
                buf,
                "{}",
                format.render(ts.as_deref(), location, record.level(), record.args())
            )
        })
        .target(Target::Pipe(Box::new(tee)))
        .build()
}

/// Installs the global logger.
pub fn init(config: &LogConfig, mirror: Option<File>) -> Result<(), SetLoggerError> {
    let err_mirror = mirror.as_ref().and_then(|file| file.try_clone().ok());

    let out = build(
        config,
        Tee {
            stream: Stream::Stdout,
            mirror,
        },
    );
    let err = build(
        config,
        Tee {
            stream: Stream::Stderr,
            mirror: err_mirror,
        },
    );
    let max_level = out.filter();

    log::set_boxed_logger(Box::new(Router { out, err }))?;
    log::set_max_level(max_level);
    Ok(())
}
