//! Errors that stop the supervisor.
//!
//! Anything a single reader can recover from (an empty pipe, a pipe that went
//! away, a read failure) is logged where it happens and never becomes an
//! [`Error`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("TargetDir not found: {}", .0.display())]
    TargetDir(PathBuf),
    #[error("Failed to list {}: {source}", .path.display())]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("fsnotify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Event stream closed")]
    EventStreamClosed,
    #[error("TargetDir {} was removed", .0.display())]
    RootRemoved(PathBuf),
    #[error("Watcher task failed: {0}")]
    WatcherTask(#[from] tokio::task::JoinError),
}
