//! CLI Integration Tests
//!
//! Runs the `langbridge` binary and checks:
//! 1. Argument validation failures exit non-zero with a message
//! 2. A started broker accepts endpoints and answers them

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

// ============================================================================
// Test Helpers
// ============================================================================

fn langbridge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_langbridge"))
}

/// Reserves a free local port by binding and releasing it.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Kills the broker process when the test ends, pass or fail.
struct BrokerProcess(Child);

impl Drop for BrokerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

async fn connect_with_retry(addr: &str) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("broker never started listening on {}", addr);
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[test]
fn test_invalid_bind_address() {
    let output = langbridge().args(["-b", "invalid-address"]).output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to start broker"), "stderr: {}", stderr);
}

#[test]
fn test_zero_queue_capacity() {
    let output = langbridge()
        .args(["--queue-capacity", "0"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("queue-capacity"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_flag() {
    let output = langbridge().args(["--nodes", "x"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_help() {
    let output = langbridge().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--queue-capacity"));
}

// ============================================================================
// Startup Tests
// ============================================================================

#[tokio::test]
async fn test_broker_answers_endpoints() {
    let addr = format!("127.0.0.1:{}", free_port().await);
    let _broker = BrokerProcess(
        langbridge()
            .args(["-b", &addr])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap(),
    );

    let stream = connect_with_retry(&addr).await;
    let (read, mut write) = stream.into_split();

    // Create an object of a class nobody registered
    write
        .write_all(b"00002{\"name\":\"Nothing\",\"varName\":\"n\",\"arguments\":[]}\n")
        .await
        .unwrap();

    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), BufReader::new(read).read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert!(line.starts_with("0000500000UnknownClass: "), "got {:?}", line);
}
