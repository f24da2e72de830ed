//! Integration tests for the wget transport.
//!
//! A small shell script stands in for wget: it honours `--output-document`,
//! prints a `--server-response` style exchange on stderr and exits with the
//! code wget would use.
//!
//! Run with: `cargo test --test wget_transport`

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use meiligrab::download::{
    DownloadEngine, DownloadError, FetchOptions, Outcome, ProgressEvent, RecordingProgress,
    WgetTransport,
};
use meiligrab::metadata::{self, ArtifactMetadata};
use meiligrab::release::ReleaseSource;
use meiligrab::target::{ArtifactMatrix, MatrixLayout, PlatformArch, TargetDescriptor};

// ============================================================================
// Helper Functions
// ============================================================================

/// Write an executable stand-in for wget running `body` after argument parsing.
///
/// `$out` holds the output document path and `$inm` the If-None-Match header
/// (empty when absent).
fn fake_wget(dir: &Path, body: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
out=""
inm=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-document) out="$2"; shift 2 ;;
    --header) inm="$2"; shift 2 ;;
    *) shift ;;
  esac
done
{body}
"#
    );
    let path = dir.join("fake-wget");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn linux_target(root: &Path) -> TargetDescriptor {
    let layout = MatrixLayout {
        packages_dir: root.join("packages"),
        ..MatrixLayout::default()
    };
    ArtifactMatrix::new(&layout)
        .unwrap()
        .get(PlatformArch::LinuxAmd64)
        .cloned()
        .unwrap()
}

fn engine(program: PathBuf) -> DownloadEngine {
    DownloadEngine::new(
        Box::new(WgetTransport::new(program)),
        ReleaseSource::default(),
        "2.0.0",
    )
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn test_fresh_download_through_wget() {
    let dir = TempDir::new().unwrap();
    let program = fake_wget(
        dir.path(),
        r#"printf 'meilisearch' > "$out"
echo '  HTTP/1.1 200 OK' >&2
echo '  Content-Length: 11' >&2
echo '  ETag: "w1"' >&2
exit 0"#,
    );
    let target = linux_target(dir.path());
    let progress = Arc::new(RecordingProgress::new());

    let session = engine(program)
        .fetch(
            &target,
            "v1.12.1",
            &FetchOptions {
                progress: progress.clone(),
                ..FetchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(session.outcome, Outcome::Fresh);
    assert_eq!(session.bytes_written, 11);
    assert_eq!(session.validator, "w1");
    assert_eq!(
        std::fs::read(&target.local_binary_path).unwrap(),
        b"meilisearch"
    );
    assert_eq!(
        metadata::read(&target.local_metadata_path).await.version,
        "2.0.0-v1.12.1"
    );
    assert_eq!(
        progress.events(),
        vec![
            ProgressEvent::start("meilisearch-linux-amd64", 0),
            ProgressEvent::start("meilisearch-linux-amd64", 11),
            ProgressEvent::progress(11),
        ]
    );
}

#[tokio::test]
async fn test_not_modified_keeps_validator() {
    let dir = TempDir::new().unwrap();
    // Answer 304 only when the stored validator is sent.
    let program = fake_wget(
        dir.path(),
        r#"if [ "$inm" = 'If-None-Match: "w1"' ]; then
  echo '  HTTP/1.1 304 Not Modified' >&2
  exit 8
fi
echo '  HTTP/1.1 500 Internal Server Error' >&2
exit 8"#,
    );
    let target = linux_target(dir.path());
    std::fs::create_dir_all(target.directory()).unwrap();
    std::fs::write(&target.local_binary_path, b"meilisearch").unwrap();
    metadata::write(
        &target.local_metadata_path,
        &ArtifactMetadata::new("2.0.0-v1.12.0", "w1"),
    )
    .await
    .unwrap();

    let session = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(session.outcome, Outcome::NotModified);
    assert_eq!(session.bytes_written, 0);
    let stored = metadata::read(&target.local_metadata_path).await;
    assert_eq!(stored.validator, "w1");
    assert_eq!(stored.version, "2.0.0-v1.12.1");
}

#[tokio::test]
async fn test_resume_through_wget() {
    let dir = TempDir::new().unwrap();
    let program = fake_wget(
        dir.path(),
        r#"printf 'search' >> "$out"
echo '  HTTP/1.1 206 Partial Content' >&2
echo '  ETag: "w2"' >&2
exit 0"#,
    );
    let target = linux_target(dir.path());
    std::fs::create_dir_all(target.directory()).unwrap();
    std::fs::write(&target.local_binary_path, b"meili").unwrap();

    let session = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(session.outcome, Outcome::Resumed);
    assert_eq!(session.existing_length, 5);
    assert_eq!(session.bytes_written, 6);
    assert_eq!(session.total_length, 11);
    assert_eq!(
        std::fs::read(&target.local_binary_path).unwrap(),
        b"meilisearch"
    );
}

// ============================================================================
// Stale local state
// ============================================================================

#[tokio::test]
async fn test_missing_binary_sends_no_validator() {
    let dir = TempDir::new().unwrap();
    // Answer 304 whenever a validator is sent, as the host would for "w1".
    let program = fake_wget(
        dir.path(),
        r#"if [ -n "$inm" ]; then
  echo '  HTTP/1.1 304 Not Modified' >&2
  exit 8
fi
printf 'meilisearch' > "$out"
echo '  HTTP/1.1 200 OK' >&2
echo '  ETag: "w1"' >&2
exit 0"#,
    );
    let target = linux_target(dir.path());
    metadata::write(
        &target.local_metadata_path,
        &ArtifactMetadata::new("2.0.0-v1.12.1", "w1"),
    )
    .await
    .unwrap();

    let session = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(session.outcome, Outcome::Fresh);
    assert_eq!(
        std::fs::read(&target.local_binary_path).unwrap(),
        b"meilisearch"
    );
}

#[tokio::test]
async fn test_changed_artifact_on_range_not_satisfiable_is_downloaded_again() {
    let dir = TempDir::new().unwrap();
    // With the old file in place wget gets a 416 for a different ETag; once
    // the file is gone it downloads the new artifact.
    let program = fake_wget(
        dir.path(),
        r#"if [ -s "$out" ]; then
  echo '  HTTP/1.1 416 Requested Range Not Satisfiable' >&2
  echo '  ETag: "new"' >&2
  exit 0
fi
printf 'NEWNEWNEWNE' > "$out"
echo '  HTTP/1.1 200 OK' >&2
echo '  ETag: "new"' >&2
exit 0"#,
    );
    let target = linux_target(dir.path());
    std::fs::create_dir_all(target.directory()).unwrap();
    std::fs::write(&target.local_binary_path, b"oldoldoldol").unwrap();
    metadata::write(
        &target.local_metadata_path,
        &ArtifactMetadata::new("2.0.0-v1.12.0", "old"),
    )
    .await
    .unwrap();

    let session = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(session.outcome, Outcome::Fresh);
    assert_eq!(session.validator, "new");
    assert_eq!(
        std::fs::read(&target.local_binary_path).unwrap(),
        b"NEWNEWNEWNE"
    );
}

#[tokio::test]
async fn test_changed_artifact_on_resume_is_not_appended() {
    let dir = TempDir::new().unwrap();
    let program = fake_wget(
        dir.path(),
        r#"if [ -s "$out" ]; then
  printf 'XX' >> "$out"
  echo '  HTTP/1.1 206 Partial Content' >&2
  echo '  ETag: "new"' >&2
  exit 0
fi
printf 'fresh' > "$out"
echo '  HTTP/1.1 200 OK' >&2
echo '  ETag: "new"' >&2
exit 0"#,
    );
    let target = linux_target(dir.path());
    std::fs::create_dir_all(target.directory()).unwrap();
    std::fs::write(&target.local_binary_path, b"old").unwrap();
    metadata::write(
        &target.local_metadata_path,
        &ArtifactMetadata::new("2.0.0-v1.12.0", "old"),
    )
    .await
    .unwrap();

    let session = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(session.outcome, Outcome::Fresh);
    assert_eq!(session.bytes_written, 5);
    assert_eq!(std::fs::read(&target.local_binary_path).unwrap(), b"fresh");
    assert_eq!(
        metadata::read(&target.local_metadata_path).await.validator,
        "new"
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_http_error_is_transfer_error() {
    let dir = TempDir::new().unwrap();
    let program = fake_wget(
        dir.path(),
        r#"echo '  HTTP/1.1 404 Not Found' >&2
echo 'ERROR 404: Not Found.' >&2
exit 8"#,
    );
    let target = linux_target(dir.path());

    let err = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Transfer { status: 404, .. }));
    assert!(!target.local_metadata_path.exists());
}

#[tokio::test]
async fn test_tool_failure_without_response() {
    let dir = TempDir::new().unwrap();
    let program = fake_wget(
        dir.path(),
        r#"echo 'Resolving github.com... failed: Name or service not known.' >&2
exit 4"#,
    );
    let target = linux_target(dir.path());

    let err = engine(program)
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap_err();

    match err {
        DownloadError::ExternalTool { stderr, .. } => {
            assert!(stderr.contains("Name or service not known"));
        }
        other => panic!("expected ExternalTool error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_program_is_spawn_error() {
    let dir = TempDir::new().unwrap();
    let target = linux_target(dir.path());

    let err = engine(dir.path().join("no-such-wget"))
        .fetch(&target, "v1.12.1", &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Spawn { .. }));
}
