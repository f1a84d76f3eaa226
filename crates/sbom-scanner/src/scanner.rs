//! trivy 프로세스 어댑터 -- 이미지 하나를 스캔하여 CycloneDX SBOM 생성
//!
//! [`TrivyScanner`]는 core의 [`ImageScanner`] trait을 구현합니다.
//!
//! # 스캔 흐름
//!
//! ```text
//! image ref --> normalize (registry proxy) --> NamedTempFile
//!                                                   |
//!       trivy image --quiet --format cyclonedx --output <tmp> <image>
//!                                                   |
//!                       timeout / exit status / empty / malformed check
//!                                                   |
//!                                              SBOM text
//! ```
//!
//! 임시 파일은 `NamedTempFile`이 drop될 때 지워지므로 타임아웃이나
//! 조기 반환을 포함한 모든 경로에서 정리됩니다. 타임아웃 시 자식 프로세스는
//! `kill_on_drop`으로 종료됩니다.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, info, warn};

use sbomsync_core::error::ScanError;
use sbomsync_core::image::{RegistryProxyMap, normalize};
use sbomsync_core::metrics as m;
use sbomsync_core::scan::ImageScanner;

use crate::config::TrivyScannerConfig;
use crate::error::SbomScannerError;

/// trivy 기반 이미지 스캐너
pub struct TrivyScanner {
    /// 스캐너 설정
    config: TrivyScannerConfig,
    /// 파싱된 프록시 매핑
    proxies: RegistryProxyMap,
    /// 성공한 스캔 수
    scans_completed: Arc<AtomicU64>,
    /// 실패한 스캔 수
    scans_failed: Arc<AtomicU64>,
}

impl TrivyScanner {
    /// 성공한 스캔 수를 반환합니다.
    pub fn scans_completed(&self) -> u64 {
        self.scans_completed.load(Ordering::Relaxed)
    }

    /// 실패한 스캔 수를 반환합니다.
    pub fn scans_failed(&self) -> u64 {
        self.scans_failed.load(Ordering::Relaxed)
    }

    /// 설정을 반환합니다.
    pub fn config(&self) -> &TrivyScannerConfig {
        &self.config
    }

    /// 프록시를 적용한 스캔 대상 참조
    ///
    /// 참조를 파싱할 수 없으면 원본을 그대로 사용합니다.
    pub fn scan_target(&self, image_reference: &str) -> String {
        match normalize(image_reference, &self.proxies) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(image = image_reference, error = %e, "could not normalize image reference, using it unmodified");
                image_reference.to_owned()
            }
        }
    }

    /// trivy 명령행 인자
    pub fn command_args(&self, image: &str, output: &Path) -> Vec<String> {
        let mut args = self.config.global_args.clone();
        args.extend([
            "image".to_owned(),
            "--quiet".to_owned(),
            "--format".to_owned(),
            self.config.output_format.clone(),
            "--output".to_owned(),
            output.display().to_string(),
            image.to_owned(),
        ]);
        args
    }

    async fn run(&self, image_reference: &str) -> Result<String, SbomScannerError> {
        let target = self.scan_target(image_reference);

        let output_file = tempfile::Builder::new()
            .prefix("sbomsync-")
            .suffix(".cdx.json")
            .tempfile()
            .map_err(|source| SbomScannerError::Io {
                path: std::env::temp_dir().display().to_string(),
                source,
            })?;
        let output_path = output_file.path().to_path_buf();

        let args = self.command_args(&target, &output_path);
        debug!(binary = %self.config.trivy_path, ?args, "running scanner");

        let child = Command::new(&self.config.trivy_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SbomScannerError::Spawn {
                binary: self.config.trivy_path.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.config.job_timeout(), child.wait_with_output())
            .await
            .map_err(|_| SbomScannerError::Timeout {
                image: target.clone(),
                timeout_secs: self.config.job_timeout_secs,
            })?
            .map_err(|source| SbomScannerError::Io {
                path: self.config.trivy_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SbomScannerError::ExitStatus {
                image: target,
                status: output.status.to_string(),
                stderr: truncate_utf8(
                    String::from_utf8_lossy(&output.stderr).trim(),
                    self.config.max_stderr_bytes,
                ),
            });
        }

        let sbom = tokio::fs::read_to_string(&output_path)
            .await
            .map_err(|source| SbomScannerError::Io {
                path: output_path.display().to_string(),
                source,
            })?;

        validate_sbom(&target, &sbom)?;
        Ok(sbom)
    }
}

impl ImageScanner for TrivyScanner {
    fn name(&self) -> &str {
        "trivy"
    }

    async fn scan(&self, image_reference: &str) -> Result<String, ScanError> {
        let started = Instant::now();
        let result = self.run(image_reference).await;
        metrics::histogram!(m::SCANNER_SCAN_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(sbom) => {
                self.scans_completed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::SCANNER_SCANS_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
                info!(
                    image = image_reference,
                    bytes = sbom.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "image scanned"
                );
                Ok(sbom)
            }
            Err(e) => {
                self.scans_failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::SCANNER_SCANS_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                Err(e.into())
            }
        }
    }
}

/// 출력이 비어 있지 않은 JSON 객체인지 검사합니다.
fn validate_sbom(image: &str, sbom: &str) -> Result<(), SbomScannerError> {
    if sbom.trim().is_empty() {
        return Err(SbomScannerError::EmptyOutput {
            image: image.to_owned(),
        });
    }
    match serde_json::from_str::<serde_json::Value>(sbom) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(_) => Err(SbomScannerError::MalformedOutput {
            image: image.to_owned(),
            reason: "document is not a JSON object".to_owned(),
        }),
        Err(e) => Err(SbomScannerError::MalformedOutput {
            image: image.to_owned(),
            reason: e.to_string(),
        }),
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// [`TrivyScanner`] 빌더
#[derive(Default)]
pub struct TrivyScannerBuilder {
    config: Option<TrivyScannerConfig>,
}

impl TrivyScannerBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 스캐너 설정을 지정합니다.
    pub fn config(mut self, config: TrivyScannerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 스캐너를 빌드합니다.
    ///
    /// # Errors
    ///
    /// 설정 검증 실패 시 `SbomScannerError::Config` 반환
    pub fn build(self) -> Result<TrivyScanner, SbomScannerError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let proxies = config.proxy_map()?;
        Ok(TrivyScanner {
            config,
            proxies,
            scans_completed: Arc::new(AtomicU64::new(0)),
            scans_failed: Arc::new(AtomicU64::new(0)),
        })
    }
}
