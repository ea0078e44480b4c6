//! Pull progress over a real engine client talking to a fake engine socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use build_sandbox::ImageLifecycleManager;
use container_runtime::{DockerConfig, DockerEngine};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

use common::build_image;

/// Answer `/_ping` and `/images/create` with canned bodies; the pull answer
/// is sent after `pull_delay`.
fn spawn_engine(listener: UnixListener, pull_body: Vec<u8>, pull_delay: Duration) {
    let pull_body = Arc::new(pull_body);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let pull_body = pull_body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request_line = String::from_utf8_lossy(&request)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();

                let reply = if request_line.contains("/_ping") {
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK".to_vec()
                } else if request_line.contains("/images/create") {
                    tokio::time::sleep(pull_delay).await;
                    let mut out = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n".to_vec();
                    out.extend_from_slice(&pull_body);
                    out
                } else {
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec()
                };
                let _ = stream.write_all(&reply).await;
                let _ = stream.shutdown().await;
            });
        }
    });
}

async fn manager_for(
    pull_body: Vec<u8>,
    pull_delay: Duration,
    request_timeout: Duration,
) -> (tempfile::TempDir, ImageLifecycleManager) {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("engine.sock");
    spawn_engine(UnixListener::bind(&socket).unwrap(), pull_body, pull_delay);

    let config = DockerConfig::default()
        .with_socket(&socket)
        .with_request_timeout(request_timeout);
    let engine = DockerEngine::connect(config).await.unwrap();
    (dir, ImageLifecycleManager::new(Arc::new(engine)))
}

#[tokio::test]
async fn test_non_utf8_line_does_not_end_the_pull() {
    let mut body = br#"{"status":"Downloading","id":"l1","progressDetail":{"current":1,"total":2}}"#.to_vec();
    body.extend_from_slice(b"\n\xff\xfe garbled \xc3\x28\n");
    body.extend_from_slice(b"{\"status\":\"Download complete\",\"id\":\"l1\"}\n");
    let (_dir, manager) = manager_for(body, Duration::ZERO, Duration::from_secs(5)).await;

    let mut progress = manager.pull(&build_image()).await.unwrap();
    let mut events = Vec::new();
    while let Some(item) = progress.next().await {
        events.push(item.unwrap());
    }

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].percentage(), 50);
    assert_eq!(events[1].status, "Download complete");
    assert_eq!(progress.skipped_lines(), 1);
}

#[tokio::test]
async fn test_slow_pull_outlasts_request_timeout() {
    let body = b"{\"status\":\"Pulling fs layer\",\"id\":\"l1\"}\n".to_vec();
    let (_dir, manager) =
        manager_for(body, Duration::from_millis(1500), Duration::from_secs(1)).await;

    let mut progress = manager.pull(&build_image()).await.unwrap();
    let first = progress.next().await.unwrap().unwrap();
    assert_eq!(first.status, "Pulling fs layer");
    assert!(progress.next().await.is_none());
}
