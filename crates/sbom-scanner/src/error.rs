//! SBOM 스캐너 에러 타입
//!
//! [`SbomScannerError`]는 스캐너 크레이트 내부 에러입니다.
//! [`ImageScanner`](sbomsync_core::ImageScanner) 경계에서는
//! `From<SbomScannerError> for ScanError`로 core의 스캔 실패 유형으로 바뀝니다.

use sbomsync_core::error::{ConfigError, SbomSyncError, ScanError};

/// SBOM 스캐너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SbomScannerError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 스캐너 프로세스 시작 실패
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        /// 실행 파일
        binary: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },

    /// 0이 아닌 종료 코드
    #[error("scanner exited with {status} for '{image}': {stderr}")]
    ExitStatus {
        /// 스캔 대상 이미지
        image: String,
        /// 종료 상태
        status: String,
        /// 표준 에러 출력 (잘림)
        stderr: String,
    },

    /// 제한 시간 초과
    #[error("scan of '{image}' timed out after {timeout_secs}s")]
    Timeout {
        /// 스캔 대상 이미지
        image: String,
        /// 제한 시간 (초)
        timeout_secs: u64,
    },

    /// 출력이 비어 있음
    #[error("empty sbom for '{image}'")]
    EmptyOutput {
        /// 스캔 대상 이미지
        image: String,
    },

    /// 출력이 CycloneDX JSON 문서가 아님
    #[error("malformed sbom for '{image}': {reason}")]
    MalformedOutput {
        /// 스캔 대상 이미지
        image: String,
        /// 사유
        reason: String,
    },

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },
}

impl From<SbomScannerError> for ScanError {
    fn from(err: SbomScannerError) -> Self {
        match err {
            SbomScannerError::Config { field, reason } => ScanError::Spawn {
                binary: field,
                reason,
            },
            SbomScannerError::Spawn { binary, source } => ScanError::Spawn {
                binary,
                reason: source.to_string(),
            },
            SbomScannerError::ExitStatus {
                image,
                status,
                stderr,
            } => ScanError::ExitStatus {
                image,
                status,
                stderr,
            },
            SbomScannerError::Timeout {
                image,
                timeout_secs,
            } => ScanError::Timeout {
                image,
                timeout_secs,
            },
            SbomScannerError::EmptyOutput { image } => ScanError::EmptyOutput { image },
            SbomScannerError::MalformedOutput { image, reason } => {
                ScanError::MalformedOutput { image, reason }
            }
            SbomScannerError::Io { path, source } => ScanError::Io(std::io::Error::new(
                source.kind(),
                format!("{path}: {source}"),
            )),
        }
    }
}

impl From<SbomScannerError> for SbomSyncError {
    fn from(err: SbomScannerError) -> Self {
        match err {
            SbomScannerError::Config { field, reason } => {
                SbomSyncError::Config(ConfigError::InvalidValue { field, reason })
            }
            other => SbomSyncError::Scan(other.into()),
        }
    }
}
