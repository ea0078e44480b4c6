//! SelfUpgrader against a local HTTP release server.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use self_upgrade::{
    backup_path_for, FileOps, ReleaseEndpoints, ReleaseSource, SelfUpgrader, UpgradeError,
    UpgradeOutcome, VersionCheck, DEFAULT_TIMEOUT, DEV_VERSION,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORMULA: &str = "deployctl/tap/cli";

async fn release_server(tag: &str, binary: &[u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tag_name": tag })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{}/deployctl", tag)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(binary.to_vec()))
        .mount(&server)
        .await;
    server
}

fn upgrader(server: &MockServer, current: &str) -> SelfUpgrader {
    let endpoints = ReleaseEndpoints {
        latest_url: format!("{}/releases/latest", server.uri()),
        download_url: format!("{}/download/{{version}}/deployctl", server.uri()),
        timeout: DEFAULT_TIMEOUT,
    };
    let source = ReleaseSource::new(endpoints, "deployctl-tests").unwrap();
    SelfUpgrader::new(current, source, FORMULA)
}

fn installed_binary(dir: &TempDir) -> PathBuf {
    let exe = dir.path().join("deployctl");
    std::fs::write(&exe, b"old binary").unwrap();
    exe
}

fn staging_leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".deployctl-upgrade-"))
        .collect()
}

/// Fails the second rename, as a read-only target would.
struct ReadOnlyTarget {
    renames: AtomicUsize,
}

impl FileOps for ReadOnlyTarget {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.renames.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only file system"));
        }
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

#[tokio::test]
async fn test_check_reports_available_version() {
    let server = release_server("v1.4.0", b"new").await;

    let check = upgrader(&server, "v1.3.0").check().await.unwrap();
    assert_eq!(check, VersionCheck::Available("v1.4.0".to_string()));

    let check = upgrader(&server, "v1.4.0").check().await.unwrap();
    assert_eq!(check, VersionCheck::UpToDate);
}

#[tokio::test]
async fn test_homebrew_install_compares_suffixed_versions() {
    let server = release_server("v1.4.0", b"new").await;

    let up = upgrader(&server, "v1.4.0b");
    assert_eq!(up.latest_version().await.unwrap(), "v1.4.0b");
    assert_eq!(up.check().await.unwrap(), VersionCheck::UpToDate);
}

#[tokio::test]
async fn test_development_build_never_upgrades() {
    let server = MockServer::start().await;
    let check = upgrader(&server, DEV_VERSION).check().await.unwrap();
    assert_eq!(check, VersionCheck::Development);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_lookup_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "rate limited" })))
        .mount(&server)
        .await;

    let err = upgrader(&server, "v1.3.0").check().await.unwrap_err();
    assert!(matches!(err, UpgradeError::VersionLookup { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_upgrade_replaces_binary() {
    use std::os::unix::fs::PermissionsExt;

    let server = release_server("v1.4.0", b"new binary").await;
    let dir = TempDir::new().unwrap();
    let exe = installed_binary(&dir);

    let outcome = upgrader(&server, "v1.3.0")
        .upgrade_binary_at(&exe, "v1.4.0")
        .await
        .unwrap();

    let canonical = std::fs::canonicalize(&exe).unwrap();
    assert_eq!(
        outcome,
        UpgradeOutcome::Replaced {
            path: canonical,
            version: "v1.4.0".to_string(),
            leftover_backup: None,
        }
    );
    assert_eq!(std::fs::read(&exe).unwrap(), b"new binary");
    let mode = std::fs::metadata(&exe).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    assert!(!backup_path_for(&exe).exists());
    assert!(staging_leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_download_failure_leaves_binary_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/v9.9.9/deployctl"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let exe = installed_binary(&dir);

    let err = upgrader(&server, "v1.3.0")
        .upgrade_binary_at(&exe, "v9.9.9")
        .await
        .unwrap_err();

    assert!(matches!(err, UpgradeError::DownloadFailed { .. }));
    assert!(err.is_retryable());
    assert_eq!(std::fs::read(&exe).unwrap(), b"old binary");
    assert!(!backup_path_for(&exe).exists());
    assert!(staging_leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_empty_download_is_rejected() {
    let server = release_server("v1.4.0", b"").await;
    let dir = TempDir::new().unwrap();
    let exe = installed_binary(&dir);

    let err = upgrader(&server, "v1.3.0")
        .upgrade_binary_at(&exe, "v1.4.0")
        .await
        .unwrap_err();

    assert!(matches!(err, UpgradeError::DownloadFailed { .. }));
    assert_eq!(std::fs::read(&exe).unwrap(), b"old binary");
    assert!(staging_leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_failed_install_restores_original() {
    let server = release_server("v1.4.0", b"new binary").await;
    let dir = TempDir::new().unwrap();
    let exe = installed_binary(&dir);
    let ops = Arc::new(ReadOnlyTarget {
        renames: AtomicUsize::new(0),
    });

    let err = upgrader(&server, "v1.3.0")
        .with_file_ops(ops)
        .upgrade_binary_at(&exe, "v1.4.0")
        .await
        .unwrap_err();

    assert!(matches!(err, UpgradeError::ReplaceFailed { .. }));
    assert!(!err.requires_manual_recovery());
    assert_eq!(std::fs::read(&exe).unwrap(), b"old binary");
    assert!(!backup_path_for(&exe).exists());
    assert!(staging_leftovers(dir.path()).is_empty());
}
