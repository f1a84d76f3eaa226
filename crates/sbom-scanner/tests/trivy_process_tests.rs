//! 가짜 trivy 스크립트로 프로세스 경로를 검증하는 통합 테스트
//!
//! 스크립트는 `sh <script> image ... --output <path> <image>` 형태로 실행되며
//! 받은 출력 경로를 `seen_output` 파일에 기록합니다.

#![cfg(unix)]

use std::path::{Path, PathBuf};

use sbomsync_core::error::ScanError;
use sbomsync_core::scan::ImageScanner;
use sbomsync_sbom_scanner::{TrivyScanner, TrivyScannerBuilder, TrivyScannerConfigBuilder};

const PREAMBLE: &str = r#"
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output" ]; then out="$arg"; fi
  prev="$arg"
done
last="$arg"
echo "$out" > "$(dirname "$0")/seen_output"
echo "$last" > "$(dirname "$0")/seen_image"
"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-trivy.sh");
    std::fs::write(&path, format!("{PREAMBLE}\n{body}\n")).unwrap();
    path
}

fn scanner(script: &Path, timeout_secs: u64, proxies: Vec<String>) -> TrivyScanner {
    let config = TrivyScannerConfigBuilder::new()
        .trivy_path("sh")
        .global_args(vec![script.display().to_string()])
        .job_timeout_secs(timeout_secs)
        .registry_proxies(proxies)
        .build()
        .unwrap();
    TrivyScannerBuilder::new().config(config).build().unwrap()
}

fn seen_output(dir: &Path) -> PathBuf {
    PathBuf::from(std::fs::read_to_string(dir.join("seen_output")).unwrap().trim())
}

#[tokio::test]
async fn successful_scan_returns_sbom_and_removes_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"printf '{"bomFormat":"CycloneDX","specVersion":"1.5"}' > "$out""#,
    );
    let scanner = scanner(&script, 30, vec![]);

    let sbom = scanner.scan("registry.io/app:1.0").await.unwrap();
    assert!(sbom.contains("CycloneDX"));
    assert_eq!(scanner.scans_completed(), 1);

    let output = seen_output(dir.path());
    assert!(!output.as_os_str().is_empty());
    assert!(!output.exists(), "temp file must be cleaned up");
}

#[tokio::test]
async fn scan_uses_proxied_reference() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), r#"printf '{}' > "$out""#);
    let scanner = scanner(&script, 30, vec!["registry.io=proxy.local".to_owned()]);

    scanner.scan("registry.io/app:1.0").await.unwrap();
    let image = std::fs::read_to_string(dir.path().join("seen_image")).unwrap();
    assert_eq!(image.trim(), "proxy.local/app:1.0");
}

#[tokio::test]
async fn non_zero_exit_is_scan_failure_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "echo 'MANIFEST_UNKNOWN' >&2\nexit 3");
    let scanner = scanner(&script, 30, vec![]);

    let err = scanner.scan("registry.io/missing:1.0").await.unwrap_err();
    match err {
        ScanError::ExitStatus { stderr, .. } => assert!(stderr.contains("MANIFEST_UNKNOWN")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(scanner.scans_failed(), 1);
    assert!(!seen_output(dir.path()).exists());
}

#[tokio::test]
async fn empty_output_is_scan_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "exit 0");
    let scanner = scanner(&script, 30, vec![]);

    let err = scanner.scan("registry.io/app:1.0").await.unwrap_err();
    assert!(matches!(err, ScanError::EmptyOutput { .. }));
}

#[tokio::test]
async fn timeout_kills_scanner_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sleep 30");
    let scanner = scanner(&script, 1, vec![]);

    let started = std::time::Instant::now();
    let err = scanner.scan("registry.io/slow:1.0").await.unwrap_err();
    assert!(matches!(err, ScanError::Timeout { timeout_secs: 1, .. }));
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
    assert!(!seen_output(dir.path()).exists());
}

#[tokio::test]
async fn missing_binary_is_spawn_failure() {
    let config = TrivyScannerConfigBuilder::new()
        .trivy_path("/nonexistent/sbomsync-trivy")
        .build()
        .unwrap();
    let scanner = TrivyScannerBuilder::new().config(config).build().unwrap();

    let err = scanner.scan("registry.io/app:1.0").await.unwrap_err();
    assert!(matches!(err, ScanError::Spawn { .. }));
}
