//! One-shot listing of the watched directory.

use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use log::debug;
use tokio::fs;

use crate::reader;
use crate::registry::CancelRegistry;
use crate::sink::SharedSink;
use crate::Error;

/// Whether `path` currently is a named pipe. Symlinks are followed.
pub async fn is_pipe(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();

    match fs::metadata(path).await {
        Ok(meta) if meta.file_type().is_fifo() => true,
        _ => {
            debug!("{} is not named pipe", path.display());
            false
        }
    }
}

/// Launches a reader for every named pipe directly inside `dir`.
///
/// Returns how many readers were newly started; pipes that already have a
/// reader are left alone. Failing to list `dir` is an [`Error::ListDir`].
pub async fn scan(
    dir: impl AsRef<Path>,
    registry: &CancelRegistry,
    sink: &SharedSink,
) -> Result<usize, Error> {
    let dir = dir.as_ref();
    debug!("Parsing {}", dir.display());

    let list_err = |source| Error::ListDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(list_err)?;
    let mut launched = 0;

    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        let path = entry.path();

        if !is_pipe(&path).await {
            continue;
        }
        debug!("{} has pipe {}", dir.display(), entry.file_name().to_string_lossy());

        if reader::launch(registry, sink, path) {
            launched += 1;
        }
    }

    Ok(launched)
}
