//! 스캐너 설정
//!
//! [`TrivyScannerConfig`]는 core의 [`ScannerConfig`](sbomsync_core::config::ScannerConfig)에
//! 스캐너 고유 설정(출력 형식, 전역 인자)을 더한 것입니다.
//!
//! # 사용 예시
//!
//! ```
//! use sbomsync_sbom_scanner::TrivyScannerConfigBuilder;
//!
//! let config = TrivyScannerConfigBuilder::new()
//!     .trivy_path("/usr/local/bin/trivy")
//!     .job_timeout_secs(600)
//!     .registry_proxies(vec!["registry.io=proxy.local".to_owned()])
//!     .build()
//!     .unwrap();
//! assert_eq!(config.job_timeout_secs, 600);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sbomsync_core::image::RegistryProxyMap;

use crate::error::SbomScannerError;

/// 최대 스캔 제한 시간 (1일)
const MAX_JOB_TIMEOUT_SECS: u64 = 86_400;

/// trivy 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrivyScannerConfig {
    /// trivy 실행 파일
    pub trivy_path: String,
    /// 이미지 하나당 제한 시간 (초)
    pub job_timeout_secs: u64,
    /// 레지스트리 프록시 매핑 (`from=to`)
    pub registry_proxies: Vec<String>,

    // --- 스캐너 고유 확장 ---
    /// SBOM 출력 형식 (`--format`)
    pub output_format: String,
    /// 하위 명령 앞에 붙는 전역 인자 (`--cache-dir` 등)
    pub global_args: Vec<String>,
    /// 에러 메시지에 남길 stderr 최대 길이 (바이트)
    pub max_stderr_bytes: usize,
}

impl Default for TrivyScannerConfig {
    fn default() -> Self {
        Self {
            trivy_path: "trivy".to_owned(),
            job_timeout_secs: 3600,
            registry_proxies: Vec::new(),
            output_format: "cyclonedx".to_owned(),
            global_args: Vec::new(),
            max_stderr_bytes: 2048,
        }
    }
}

impl TrivyScannerConfig {
    /// core 설정에서 스캐너 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값을 사용합니다.
    pub fn from_core(core: &sbomsync_core::config::ScannerConfig) -> Self {
        Self {
            trivy_path: core.trivy_path.clone(),
            job_timeout_secs: core.job_timeout_secs,
            registry_proxies: core.registry_proxies.clone(),
            ..Self::default()
        }
    }

    /// 제한 시간
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// 파싱된 프록시 매핑
    pub fn proxy_map(&self) -> Result<RegistryProxyMap, SbomScannerError> {
        RegistryProxyMap::parse(&self.registry_proxies).map_err(|reason| {
            SbomScannerError::Config {
                field: "registry_proxies".to_owned(),
                reason,
            }
        })
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `trivy_path`: 비어 있으면 안 됨
    /// - `job_timeout_secs`: 1-86400
    /// - `output_format`: `cyclonedx`만 지원
    /// - `registry_proxies`: 모두 `from=to` 형식
    pub fn validate(&self) -> Result<(), SbomScannerError> {
        if self.trivy_path.trim().is_empty() {
            return Err(SbomScannerError::Config {
                field: "trivy_path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.job_timeout_secs == 0 || self.job_timeout_secs > MAX_JOB_TIMEOUT_SECS {
            return Err(SbomScannerError::Config {
                field: "job_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_JOB_TIMEOUT_SECS}"),
            });
        }

        if self.output_format != "cyclonedx" {
            return Err(SbomScannerError::Config {
                field: "output_format".to_owned(),
                reason: "only 'cyclonedx' is supported".to_owned(),
            });
        }

        self.proxy_map()?;
        Ok(())
    }
}

/// [`TrivyScannerConfig`] 빌더
#[derive(Default)]
pub struct TrivyScannerConfigBuilder {
    config: TrivyScannerConfig,
}

impl TrivyScannerConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 파일 경로를 설정합니다.
    pub fn trivy_path(mut self, path: impl Into<String>) -> Self {
        self.config.trivy_path = path.into();
        self
    }

    /// 제한 시간(초)을 설정합니다.
    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = secs;
        self
    }

    /// 레지스트리 프록시 매핑을 설정합니다.
    pub fn registry_proxies(mut self, proxies: Vec<String>) -> Self {
        self.config.registry_proxies = proxies;
        self
    }

    /// 전역 인자를 설정합니다.
    pub fn global_args(mut self, args: Vec<String>) -> Self {
        self.config.global_args = args;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `SbomScannerError::Config` 반환
    pub fn build(self) -> Result<TrivyScannerConfig, SbomScannerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
