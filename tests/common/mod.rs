#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nafder::sink::format_line;
use nafder::{LineSink, SharedSink};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use tokio::net::unix::pipe;
use tokio::sync::mpsc;
use tokio::time::{self, timeout, Instant};

pub const TIMEOUT_2_SEC: Duration = Duration::from_millis(2000);

pub fn mkfifo(path: &Path) {
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o644))
        .unwrap_or_else(|e| panic!("mkfifo {} failed: {}", path.display(), e));
}

/// Collects every emitted line, already formatted.
pub struct ChannelSink(mpsc::UnboundedSender<Vec<u8>>);

impl LineSink for ChannelSink {
    fn write_line(&self, prefix: &str, line: &[u8]) {
        let _ = self.0.send(format_line(prefix, line, None));
    }
}

pub fn channel_sink() -> (SharedSink, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSink(tx)), rx)
}

pub async fn recv_line(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> String {
    let line = timeout(TIMEOUT_2_SEC, rx.recv())
        .await
        .expect("timed out waiting for a line")
        .expect("sink closed");
    String::from_utf8(line).unwrap()
}

/// Opens the write end once a reader holds the pipe open.
pub async fn open_writer(path: &Path) -> pipe::Sender {
    let deadline = Instant::now() + TIMEOUT_2_SEC;

    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(sender) => return sender,
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) && Instant::now() < deadline => {
                time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("cannot open {} for writing: {}", path.display(), e),
        }
    }
}

/// Polls `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT_2_SEC, async {
        while !cond() {
            time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
