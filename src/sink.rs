//! Where prefixed pipe lines end up.

use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

/// Format used for `--time`, matching the diagnostic log timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Receives every complete line read from a pipe.
///
/// `line` still carries its trailing newline.
pub trait LineSink: Send + Sync {
    fn write_line(&self, prefix: &str, line: &[u8]);
}

pub type SharedSink = Arc<dyn LineSink>;

/// Renders `<prefix> <line>`, optionally preceded by a timestamp.
pub fn format_line(prefix: &str, line: &[u8], timestamp: Option<&str>) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + line.len() + 21);
    if let Some(ts) = timestamp {
        out.extend_from_slice(ts.as_bytes());
        out.push(b' ');
    }
    out.extend_from_slice(prefix.as_bytes());
    out.push(b' ');
    out.extend_from_slice(line);
    out
}

/// Writes lines to stdout, mirrored to a file when one is configured.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    timestamp: bool,
    mirror: Option<Mutex<File>>,
    mirror_failed: AtomicBool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.timestamp = enabled;
        self
    }

    pub fn with_mirror(mut self, file: Option<File>) -> Self {
        self.mirror = file.map(Mutex::new);
        self
    }

    fn write_mirror(&self, buf: &[u8]) -> io::Result<()> {
        if let Some(mirror) = &self.mirror {
            let mut file = mirror.lock().unwrap_or_else(PoisonError::into_inner);
            file.write_all(buf)?;
        }
        Ok(())
    }
}

impl LineSink for ConsoleSink {
    fn write_line(&self, prefix: &str, line: &[u8]) {
        let ts = self
            .timestamp
            .then(|| chrono::Local::now().format(TIMESTAMP_FORMAT).to_string());
        let buf = format_line(prefix, line, ts.as_deref());

        {
            let mut stdout = io::stdout().lock();
            // Nothing sensible to do if stdout is gone.
            let _ = stdout.write_all(&buf).and_then(|_| stdout.flush());
        }

        if let Err(e) = self.write_mirror(&buf) {
            if !self.mirror_failed.swap(true, Ordering::Relaxed) {
                warn!("Cannot write to copy file: {}", e);
            }
        }
    }
}
