//! Ties scanning, watching and the readers together for the process lifetime.

use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::events::{self, PipeEvents};
use crate::registry::CancelRegistry;
use crate::scanner;
use crate::sink::SharedSink;
use crate::Error;

/// How often the directory is rescanned when nothing else is configured.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest rescan interval; anything below is raised to it.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

/// Owns the registry and drives both discovery paths.
///
/// Events give low latency, the periodic scan catches what they miss (pipes
/// created before the watch was attached, dropped events). The shared
/// [`CancelRegistry`] keeps the two from ever starting the same reader twice.
pub struct Supervisor {
    root: PathBuf,
    interval: Duration,
    registry: CancelRegistry,
    sink: SharedSink,
}

impl Debug for Supervisor {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("Supervisor")
            .field("root", &self.root)
            .field("interval", &self.interval)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Supervisor {
    pub fn new(root: impl Into<PathBuf>, sink: SharedSink) -> Self {
        Supervisor {
            root: root.into(),
            interval: DEFAULT_SCAN_INTERVAL,
            registry: CancelRegistry::new(),
            sink,
        }
    }

    /// Sets the rescan interval, never shorter than [`MIN_SCAN_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_SCAN_INTERVAL);
        self
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The registry shared with every reader this supervisor starts.
    pub fn registry(&self) -> &CancelRegistry {
        &self.registry
    }

    /// Runs one scan of the target directory.
    pub async fn scan(&self) -> Result<usize, Error> {
        scanner::scan(&self.root, &self.registry, &self.sink).await
    }

    /// Watches and rescans until something fatal happens.
    ///
    /// Only ever returns an error: failing to list the directory, the event
    /// watcher failing or ending, or the directory itself being removed.
    pub async fn run(&self) -> Result<(), Error> {
        debug!("Target Directory is {}", self.root.display());

        // Attach first so nothing created during the initial scan is missed.
        let events = PipeEvents::new(&self.root)?;
        self.scan().await?;

        // Aborted on drop, so the watcher never outlives `run`.
        let mut watcher = JoinSet::new();
        watcher.spawn(events::watch(
            events,
            self.registry.clone(),
            self.sink.clone(),
        ));

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("start mainloop");
        loop {
            tokio::select! {
                res = watcher.join_next() => {
                    return match res {
                        Some(Ok(Err(e))) => Err(e),
                        Some(Err(e)) => Err(Error::WatcherTask(e)),
                        Some(Ok(Ok(()))) | None => Err(Error::EventStreamClosed),
                    };
                }
                _ = ticker.tick() => {
                    self.scan().await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{channel_sink, mkfifo};
    use tokio::time::timeout;

    #[test]
    fn test_defaults() {
        let (sink, _lines) = channel_sink();
        let supervisor = Supervisor::new("/tmp/pipes", sink);

        assert_eq!(supervisor.interval(), DEFAULT_SCAN_INTERVAL);
        assert_eq!(supervisor.root(), Path::new("/tmp/pipes"));
        assert!(supervisor.registry().is_empty());

        let (sink, _lines) = channel_sink();
        let supervisor = Supervisor::new("/tmp/pipes", sink).with_interval(Duration::from_secs(5));
        assert_eq!(supervisor.interval(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let (sink, _lines) = channel_sink();
        let supervisor = Supervisor::new(tmp_dir.path(), sink).with_interval(Duration::ZERO);
        assert_eq!(supervisor.interval(), MIN_SCAN_INTERVAL);

        // Keeps rescanning instead of failing to build the ticker.
        assert!(timeout(Duration::from_millis(100), supervisor.run()).await.is_err());
    }

    #[tokio::test]
    async fn test_run_missing_root() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let (sink, _lines) = channel_sink();
        let supervisor = Supervisor::new(tmp_dir.path().join("missing"), sink);

        assert!(supervisor.run().await.is_err());
    }

    #[tokio::test]
    async fn test_run_picks_up_existing_pipes() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let root = tmp_dir.path().canonicalize().unwrap();
        mkfifo(&root.join("early"));

        let (sink, _lines) = channel_sink();
        let supervisor = Supervisor::new(&root, sink);

        // `run` never returns while the directory is healthy.
        let _ = timeout(Duration::from_millis(300), supervisor.run()).await;

        assert!(supervisor.registry().contains(root.join("early")));
    }
}
