//! Everything related to reading lines from a single named pipe.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::time::{self, Instant};

use crate::registry::{cancel_pair, CancelRegistry, CancelSignal};
use crate::sink::{LineSink, SharedSink};

/// Delay before retrying a pipe that had nothing to read.
pub const READ_BACKOFF: Duration = Duration::from_millis(100);

type LineReader = BufReader<pipe::Receiver>;

// Opens `O_RDONLY | O_NONBLOCK`, so a pipe without a writer does not block,
// and refuses anything that is not a FIFO.
fn new_linereader(path: impl AsRef<Path>) -> io::Result<LineReader> {
    let receiver = pipe::OpenOptions::new().open_receiver(path.as_ref())?;
    Ok(BufReader::new(receiver))
}

/// Why a [`PipeReader`] stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exit {
    /// Its cancellation handle fired or was dropped.
    Cancelled,
    /// The pipe no longer exists.
    Deleted,
    /// The pipe could not be opened.
    OpenFailed,
    /// Reading failed with something other than "no data yet".
    ReadFailed,
}

/// Registers `path` and, if nobody owns it yet, spawns a reader for it.
///
/// Returns `false` when another discovery path already started a reader.
/// Must be called from within a tokio runtime.
pub fn launch(registry: &CancelRegistry, sink: &SharedSink, path: PathBuf) -> bool {
    let (handle, signal) = cancel_pair();

    if !registry.try_register(&path, handle) {
        return false;
    }

    let reader = PipeReader::new(path, signal, registry.clone(), sink.clone());
    tokio::spawn(reader.run());
    true
}

/// Tails one named pipe until it is cancelled, deleted or fails.
pub struct PipeReader {
    path: PathBuf,
    prefix: String,
    signal: CancelSignal,
    registry: CancelRegistry,
    sink: SharedSink,
}

// Drops the reader's registry entry on every exit path, panics included.
struct Registration {
    registry: CancelRegistry,
    path: PathBuf,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.path, self.id);
    }
}

impl PipeReader {
    pub fn new(
        path: PathBuf,
        signal: CancelSignal,
        registry: CancelRegistry,
        sink: SharedSink,
    ) -> Self {
        let prefix = prefix_for(&path);

        PipeReader {
            path,
            prefix,
            signal,
            registry,
            sink,
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Runs the read loop to completion.
    pub async fn run(self) -> Exit {
        let PipeReader {
            path,
            prefix,
            mut signal,
            registry,
            sink,
        } = self;

        let _registration = Registration {
            registry,
            path: path.clone(),
            id: signal.id(),
        };

        let mut reader = match new_linereader(&path) {
            Ok(reader) => reader,
            Err(e) => {
                error!("Open named pipe file error: {}: {}", path.display(), e);
                return Exit::OpenFailed;
            }
        };
        info!("Reading {}", path.display());

        let exit = stream_lines(&path, &prefix, &mut reader, &mut signal, &*sink).await;

        drop(reader);
        info!("Closing {}", path.display());
        exit
    }
}

/// The line prefix for a pipe: its basename.
pub fn prefix_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn is_gone(path: &Path) -> bool {
    matches!(
        tokio::fs::metadata(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound
    )
}

// What one pass of the read loop ended with.
enum Step {
    Line,
    Idle,
    Quiet,
    Cancelled,
    Failed,
}

async fn stream_lines(
    path: &Path,
    prefix: &str,
    reader: &mut LineReader,
    signal: &mut CancelSignal,
    sink: &dyn LineSink,
) -> Exit {
    // Survives across iterations so a line split over several writes is
    // emitted once, whole.
    let mut line = Vec::new();

    loop {
        if signal.is_cancelled() {
            drain(prefix, reader, &mut line, sink).await;
            return Exit::Cancelled;
        }

        if is_gone(path).await {
            info!("{} is deleted", path.display());
            drain(prefix, reader, &mut line, sink).await;
            return Exit::Deleted;
        }

        let step = tokio::select! {
            biased;

            _ = signal.cancelled() => Step::Cancelled,

            res = reader.read_until(b'\n', &mut line) => match res {
                // No writer attached.
                Ok(0) => Step::Idle,
                Ok(_) if line.ends_with(b"\n") => Step::Line,
                // Writer closed mid-line; keep the partial bytes.
                Ok(_) => Step::Idle,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => Step::Idle,
                Err(e) => {
                    error!("READ err: {}: {}", path.display(), e);
                    Step::Failed
                }
            },

            // A writer is attached but quiet; go around to re-check.
            _ = time::sleep(READ_BACKOFF) => Step::Quiet,
        };

        match step {
            Step::Line => {
                sink.write_line(prefix, &line);
                line.clear();
            }
            Step::Idle => time::sleep(READ_BACKOFF).await,
            Step::Quiet => {}
            Step::Cancelled => {
                drain(prefix, reader, &mut line, sink).await;
                return Exit::Cancelled;
            }
            Step::Failed => return Exit::ReadFailed,
        }
    }
}

/// Emits the complete lines still buffered or sitting in the pipe.
///
/// The open handle stays readable after the path is unlinked, so lines
/// written just before a removal are not lost. Stops at end of input, on the
/// first incomplete line, or once [`READ_BACKOFF`] has passed, whichever
/// comes first, so a writer that keeps the pipe open cannot hold it up.
async fn drain(prefix: &str, reader: &mut LineReader, line: &mut Vec<u8>, sink: &dyn LineSink) {
    let deadline = Instant::now() + READ_BACKOFF;

    loop {
        match time::timeout_at(deadline, reader.read_until(b'\n', line)).await {
            Ok(Ok(n)) if n > 0 && line.ends_with(b"\n") => {
                sink.write_line(prefix, line);
                line.clear();
            }
            _ => return,
        }
    }
}
