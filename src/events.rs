//! Everything related to watching the target directory for pipes being
//! created and removed.

use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;

use futures_util::stream::{Stream as FuturesStream, StreamExt};
use log::{debug, info};
use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use tokio::sync::mpsc;

use crate::reader;
use crate::registry::CancelRegistry;
use crate::scanner::is_pipe;
use crate::sink::SharedSink;
use crate::Error;

/// A change to the entries of the watched directory.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DirEvent {
    Created(PathBuf),
    Removed(PathBuf),
}

impl DirEvent {
    pub fn path(&self) -> &Path {
        match self {
            DirEvent::Created(path) | DirEvent::Removed(path) => path.as_path(),
        }
    }
}

/// Translates a raw notify event into directory changes.
///
/// Renames count as a removal of the old name and a creation of the new one.
pub fn classify(event: notify::Event) -> Vec<DirEvent> {
    let notify::Event { kind, paths, .. } = event;

    match kind {
        EventKind::Create(_) => paths.into_iter().map(DirEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(DirEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(DirEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(DirEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            paths
                .next()
                .map(DirEvent::Removed)
                .into_iter()
                .chain(paths.map(DirEvent::Created))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Watches one directory, non-recursively, and can be polled for
/// [`DirEvent`]s.
///
/// Internally, `PipeEvents` contains a [`notify::Watcher`] from where
/// filesystem events are proxied.
pub struct PipeEvents {
    /// Only held; dropping it ends the watch.
    _watcher: notify::RecommendedWatcher,
    root: PathBuf,
    event_stream: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
    /// Classified events not handed out yet.
    pending: VecDeque<DirEvent>,
}

impl Debug for PipeEvents {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("PipeEvents")
            .field("root", &self.root)
            .field("pending", &self.pending)
            .finish()
    }
}

impl PipeEvents {
    /// Starts watching `root`. It must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            // The receiver only goes away together with the watcher.
            let _ = tx.send(res);
        })?;

        notify::Watcher::watch(&mut watcher, &root, notify::RecursiveMode::NonRecursive)
            .map_err(|source| Error::Watch {
                path: root.clone(),
                source,
            })?;

        Ok(PipeEvents {
            _watcher: watcher,
            root,
            event_stream: rx,
            pending: VecDeque::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Waits for the next directory change.
    ///
    /// Returns `None` once the underlying watcher is gone.
    pub async fn next_event(&mut self) -> Option<Result<DirEvent, Error>> {
        self.next().await
    }
}

impl FuturesStream for PipeEvents {
    type Item = Result<DirEvent, Error>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return task::Poll::Ready(Some(Ok(event)));
            }

            match futures_util::ready!(self.event_stream.poll_recv(cx)) {
                Some(Ok(event)) => {
                    let classified = classify(event);
                    self.pending.extend(classified);
                }
                Some(Err(e)) => return task::Poll::Ready(Some(Err(Error::Notify(e)))),
                None => return task::Poll::Ready(None),
            }
        }
    }
}

/// Reacts to directory changes until the event source fails.
///
/// New pipes get a reader, removed paths get their reader cancelled. Returns
/// an error when notify reports one or when the watched root itself is
/// removed, and `Ok(())` if the stream simply ends.
pub async fn watch(
    mut events: PipeEvents,
    registry: CancelRegistry,
    sink: SharedSink,
) -> Result<(), Error> {
    let root = events.root().to_path_buf();

    while let Some(event) = events.next().await {
        match event? {
            DirEvent::Created(path) => {
                if is_pipe(&path).await {
                    info!("named pipe {} is created", path.display());
                    reader::launch(&registry, &sink, path);
                }
            }
            DirEvent::Removed(path) => {
                if path == root {
                    return Err(Error::RootRemoved(root));
                }
                debug!("{} is removed", path.display());
                registry.cancel_and_remove(&path);
            }
        }
    }

    Ok(())
}
