//! Download, extraction and cache behavior against a local release server.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use recproxy::acquire::{
    AcquireError, BinaryAcquirer, DEFAULT_CACHE_DIR, DEFAULT_VERSION_MANIFEST, VERSION_MARKER_FILE,
    VersionResolver,
};
use recproxy::platform::{PlatformCatalog, PlatformTarget};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXECUTABLE_BODY: &[u8] = b"#!/bin/sh\necho proxy\n";

fn linux_target() -> &'static PlatformTarget {
    PlatformCatalog::new()
        .lookup("linux", "x86_64")
        .expect("linux x86_64 is published")
}

fn repo_with_manifest(version: &str) -> TempDir {
    let repo = TempDir::new().unwrap();
    let manifest = repo.path().join(DEFAULT_VERSION_MANIFEST);
    fs::create_dir_all(manifest.parent().unwrap()).unwrap();
    fs::write(&manifest, format!("{version}\n")).unwrap();
    repo
}

fn tar_gz_with_executable(name: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(EXECUTABLE_BODY.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, name, EXECUTABLE_BODY)
        .unwrap();
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

/// A zip whose single entry is stored without any execute bit, the way the
/// macOS builds are published.
fn zip_with_plain_file(name: &str) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    zip.start_file(name, options).unwrap();
    zip.write_all(EXECUTABLE_BODY).unwrap();
    zip.finish().unwrap().into_inner()
}

async fn release_server(version: &str, target: &PlatformTarget) -> MockServer {
    serve_release(version, target, tar_gz_with_executable(target.executable)).await
}

async fn serve_release(version: &str, target: &PlatformTarget, body: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{version}/{}", target.file_name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn acquirer(server: &MockServer) -> BinaryAcquirer {
    BinaryAcquirer::new(
        format!("{}/download/{{version}}/{{file}}", server.uri()),
        DEFAULT_CACHE_DIR,
    )
    .unwrap()
}

fn cache(repo: &Path) -> std::path::PathBuf {
    repo.join(DEFAULT_CACHE_DIR)
}

#[tokio::test]
async fn test_first_download_unpacks_and_records_version() {
    let repo = repo_with_manifest("1.2.3");
    let target = linux_target();
    let server = release_server("1.2.3", target).await;

    let state = VersionResolver::default().resolve(repo.path()).unwrap();
    assert_eq!(state.required, "1.2.3");
    assert_eq!(state.cached, None);

    let executable = acquirer(&server)
        .ensure(repo.path(), target, &state)
        .await
        .unwrap();

    assert!(executable.is_absolute());
    assert!(executable.ends_with(target.executable));
    assert_eq!(fs::read(&executable).unwrap(), EXECUTABLE_BODY);
    assert_eq!(
        fs::read_to_string(cache(repo.path()).join(VERSION_MARKER_FILE)).unwrap(),
        "1.2.3"
    );
    assert!(!cache(repo.path()).join(target.file_name).exists());

    let again = VersionResolver::default().resolve(repo.path()).unwrap();
    assert!(again.is_current());
}

#[tokio::test]
async fn test_zip_download_restores_exec_bit() {
    let repo = repo_with_manifest("1.2.3");
    let target = PlatformCatalog::new()
        .lookup("macos", "aarch64")
        .expect("macos aarch64 is published");
    assert!(target.restore_exec_bit);
    let server = serve_release("1.2.3", target, zip_with_plain_file(target.executable)).await;

    let state = VersionResolver::default().resolve(repo.path()).unwrap();
    let executable = acquirer(&server)
        .ensure(repo.path(), target, &state)
        .await
        .unwrap();

    assert_eq!(fs::read(&executable).unwrap(), EXECUTABLE_BODY);
    assert_eq!(
        fs::read_to_string(cache(repo.path()).join(VERSION_MARKER_FILE)).unwrap(),
        "1.2.3"
    );
    assert!(!cache(repo.path()).join(target.file_name).exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&executable).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[tokio::test]
async fn test_stale_cache_is_recreated() {
    let repo = repo_with_manifest("1.2.3");
    let target = linux_target();
    let server = release_server("1.2.3", target).await;

    let cache_dir = cache(repo.path());
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join(VERSION_MARKER_FILE), "1.0.0").unwrap();
    fs::write(cache_dir.join("leftover.dll"), "old").unwrap();

    let state = VersionResolver::default().resolve(repo.path()).unwrap();
    assert_eq!(state.cached.as_deref(), Some("1.0.0"));

    acquirer(&server)
        .ensure(repo.path(), target, &state)
        .await
        .unwrap();

    assert!(!cache_dir.join("leftover.dll").exists());
    assert_eq!(
        fs::read_to_string(cache_dir.join(VERSION_MARKER_FILE)).unwrap(),
        "1.2.3"
    );
}

#[tokio::test]
async fn test_current_cache_makes_no_request() {
    let repo = repo_with_manifest("1.2.3");
    let target = linux_target();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cache_dir = cache(repo.path());
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join(VERSION_MARKER_FILE), "1.2.3").unwrap();
    fs::write(cache_dir.join(target.executable), EXECUTABLE_BODY).unwrap();

    let state = VersionResolver::default().resolve(repo.path()).unwrap();
    let executable = acquirer(&server)
        .ensure(repo.path(), target, &state)
        .await
        .unwrap();
    assert!(executable.ends_with(target.executable));
}

#[tokio::test]
async fn test_missing_release_is_download_status_error() {
    let repo = repo_with_manifest("9.9.9");
    let target = linux_target();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let state = VersionResolver::default().resolve(repo.path()).unwrap();
    let err = acquirer(&server)
        .ensure(repo.path(), target, &state)
        .await
        .unwrap_err();

    match err {
        AcquireError::DownloadStatus { status, url } => {
            assert_eq!(status, 404);
            assert!(url.ends_with(target.file_name));
        }
        other => panic!("Expected DownloadStatus, got {other:?}"),
    }
    assert!(!cache(repo.path()).join(VERSION_MARKER_FILE).exists());
}

#[tokio::test]
async fn test_corrupt_archive_is_extraction_error() {
    let repo = repo_with_manifest("1.2.3");
    let target = linux_target();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a tarball".to_vec()))
        .mount(&server)
        .await;

    let state = VersionResolver::default().resolve(repo.path()).unwrap();
    let err = acquirer(&server)
        .ensure(repo.path(), target, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::ExtractionFailed { .. }), "got {err:?}");
}

#[test]
fn test_missing_manifest() {
    let repo = TempDir::new().unwrap();
    let err = VersionResolver::default().resolve(repo.path()).unwrap_err();
    assert!(matches!(err, AcquireError::ManifestMissing { .. }));
}
