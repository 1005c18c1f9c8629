//! A daemon library multiplexing lines from every named pipe in a directory
//! into a single, prefixed output stream.
//!
//! Containers running several applications usually only get one log stream
//! collected. Give each application its own named pipe in a shared directory,
//! and every line written to it comes out tagged with the pipe's name.
//!
//! Pipes are discovered two ways, both feeding one [`CancelRegistry`] so a
//! pipe never gets two readers:
//! - filesystem events (driven by [`notify`](https://crates.io/crates/notify)),
//!   see [`PipeEvents`];
//! - a periodic rescan of the directory, see [`scanner::scan`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use nafder::{ConsoleSink, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nafder::Error> {
//!     let sink = Arc::new(ConsoleSink::new().with_timestamp(true));
//!
//!     // Lines written to e.g. `/var/run/pipes/web` come out as `web <line>`.
//!     Supervisor::new("/var/run/pipes", sink)
//!         .with_interval(Duration::from_secs(10))
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Caveats
//!
//! Readers notice cancellation and deletion cooperatively, within one
//! [`READ_BACKOFF`] interval. There is no process-wide shutdown: readers live
//! until their pipe goes away or the process exits.

pub mod config;
mod error;
pub mod events;
pub mod logging;
pub mod reader;
pub mod registry;
pub mod scanner;
pub mod sink;
pub mod supervisor;

// Unit tests share the integration test helpers, which name the crate.
#[cfg(test)]
extern crate self as nafder;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod testutil;

pub use error::Error;
pub use events::{DirEvent, PipeEvents};
pub use reader::{PipeReader, READ_BACKOFF};
pub use registry::{cancel_pair, CancelHandle, CancelRegistry, CancelSignal};
pub use sink::{ConsoleSink, LineSink, SharedSink};
pub use supervisor::{Supervisor, DEFAULT_SCAN_INTERVAL, MIN_SCAN_INTERVAL};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
