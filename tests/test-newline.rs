mod common;

use std::time::Duration;

use common::{channel_sink, mkfifo, recv_line};
use nafder::Supervisor;
use tempfile::tempdir;
use tokio::process::Command;
use tokio::time;

#[tokio::test]
pub async fn test_newline() {
    let expected_line = "app foo bar\n".to_string();

    let logdir = tempdir().unwrap();
    let logdir_path = logdir.path().canonicalize().unwrap();
    let fifo = logdir_path.join("app");
    mkfifo(&fifo);

    let (sink, mut lines) = channel_sink();
    let supervisor = Supervisor::new(&logdir_path, sink);

    // The shell blocks opening the pipe until our reader has it open.
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(r#"printf 'foo bar\n' > "$1""#)
        .arg("sh")
        .arg(&fifo)
        .spawn()
        .unwrap();

    const TIMEOUT_2_SEC: Duration = Duration::from_millis(2000);

    let line_val = tokio::select! {
        res = supervisor.run() => panic!("supervisor stopped: {:?}", res),
        line = recv_line(&mut lines) => line,
    };

    let status = time::timeout(TIMEOUT_2_SEC, child.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(status.success());
    assert_eq!(expected_line, line_val);
}

#[tokio::test]
pub async fn test_line_without_newline_waits() {
    let logdir = tempdir().unwrap();
    let logdir_path = logdir.path().canonicalize().unwrap();
    let fifo = logdir_path.join("job");
    mkfifo(&fifo);

    let (sink, mut lines) = channel_sink();
    let supervisor = Supervisor::new(&logdir_path, sink);

    // Two separate writers; the first leaves its line unterminated.
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(r#"printf 'half' > "$1"; sleep 0.3; printf ' done\nnext\n' > "$1""#)
        .arg("sh")
        .arg(&fifo)
        .spawn()
        .unwrap();

    let collected = tokio::select! {
        res = supervisor.run() => panic!("supervisor stopped: {:?}", res),
        collected = async {
            vec![recv_line(&mut lines).await, recv_line(&mut lines).await]
        } => collected,
    };

    assert!(child.wait().await.unwrap().success());
    assert_eq!(collected, vec!["job half done\n", "job next\n"]);
}
