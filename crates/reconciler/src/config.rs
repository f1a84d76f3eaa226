//! 조정 엔진 설정

use serde::{Deserialize, Serialize};

use crate::error::ReconcilerError;

/// 동시 스캔 수 상한
const MAX_CONCURRENT_SCANS: usize = 256;

/// 조정 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// 동시에 실행할 수 있는 스캔 수
    pub max_concurrent_scans: usize,
    /// 모든 업로드가 성공한 파드에 처리 완료 표시를 남길지 여부
    pub mark_processed: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 4,
            mark_processed: true,
        }
    }
}

impl ReconcilerConfig {
    /// core 설정에서 조정 엔진 설정을 생성합니다.
    pub fn from_core(core: &sbomsync_core::config::SbomSyncConfig) -> Self {
        Self {
            max_concurrent_scans: core.scanner.max_concurrent_scans,
            mark_processed: !core.cluster.ignore_annotations,
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ReconcilerError> {
        if self.max_concurrent_scans == 0 || self.max_concurrent_scans > MAX_CONCURRENT_SCANS {
            return Err(ReconcilerError::Config {
                field: "max_concurrent_scans".to_owned(),
                reason: format!("must be 1-{MAX_CONCURRENT_SCANS}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ReconcilerConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ReconcilerConfig {
            max_concurrent_scans: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_core_follows_ignore_annotations() {
        let mut core = sbomsync_core::config::SbomSyncConfig::default();
        core.scanner.max_concurrent_scans = 8;
        core.cluster.ignore_annotations = true;
        let config = ReconcilerConfig::from_core(&core);
        assert_eq!(config.max_concurrent_scans, 8);
        assert!(!config.mark_processed);
    }
}
