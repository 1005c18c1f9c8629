//! Bookkeeping of which pipes currently have a reader.
//!
//! Both discovery paths (the periodic scan and the event watcher) register
//! through the same [`CancelRegistry`], so at most one reader is ever started
//! for a given path.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::watch;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Stops the reader bound to the matching [`CancelSignal`].
///
/// Cancelling is idempotent. Dropping the handle cancels as well, so a reader
/// never keeps running once its registry entry is gone.
pub struct CancelHandle {
    id: u64,
    tx: watch::Sender<bool>,
}

/// Reader side of a [`CancelHandle`].
pub struct CancelSignal {
    id: u64,
    rx: watch::Receiver<bool>,
}

/// Creates a connected handle/signal pair with a fresh registration id.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = watch::channel(false);

    (CancelHandle { id, tx }, CancelSignal { id, rx })
}

impl CancelHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Debug for CancelHandle {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("CancelHandle")
            .field("id", &self.id)
            .field("cancelled", &*self.tx.borrow())
            .finish()
    }
}

impl CancelSignal {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking check, used at the top of every reader iteration.
    pub fn is_cancelled(&self) -> bool {
        // A closed channel means the handle was dropped.
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the handle is cancelled or dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Debug for CancelSignal {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("CancelSignal")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Mapping from pipe path to the cancellation handle of its reader.
///
/// Cloning is cheap and every clone shares the same map. All operations take
/// a single lock for the whole map and never hold it while cancelling.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    entries: Arc<Mutex<HashMap<PathBuf, CancelHandle>>>,
}

impl Debug for CancelRegistry {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("CancelRegistry")
            .field("entries", &*self.lock())
            .finish()
    }
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, CancelHandle>> {
        // Every critical section leaves the map consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `handle` for `path` unless an entry already exists.
    ///
    /// Returns `false` without touching the map when `path` is already owned
    /// by a reader; the caller must not start another one.
    pub fn try_register(&self, path: impl AsRef<Path>, handle: CancelHandle) -> bool {
        let path = path.as_ref();

        let inserted = match self.lock().entry(path.to_path_buf()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        };

        if inserted {
            debug!("Adding {} into list", path.display());
        } else {
            debug!("{} is already added", path.display());
        }
        inserted
    }

    /// Removes the entry for `path` and cancels its reader.
    ///
    /// Returns `false` if there was no entry, which happens whenever two
    /// discovery paths report the same removal.
    pub fn cancel_and_remove(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        debug!("Deleting and Canceling {}", path.display());

        let removed = self.lock().remove(path);
        match removed {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => {
                debug!("{} already deleted", path.display());
                false
            }
        }
    }

    /// Like [`cancel_and_remove`](Self::cancel_and_remove), but only if the
    /// entry still belongs to registration `id`.
    ///
    /// Used by a reader deregistering itself: by then the pipe may have been
    /// removed and re-created with a new reader under the same path.
    pub fn release(&self, path: impl AsRef<Path>, id: u64) -> bool {
        let path = path.as_ref();

        let removed = {
            let mut entries = self.lock();
            match entries.get(path) {
                Some(handle) if handle.id() == id => entries.remove(path),
                _ => None,
            }
        };

        match removed {
            Some(handle) => {
                debug!("Released {}", path.display());
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock().contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the registered paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}
