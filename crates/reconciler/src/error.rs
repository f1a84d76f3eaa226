//! 조정 엔진 에러 타입
//!
//! 항목 단위 실패(스캔, 업로드, 제거)는 로그와 통계로만 남고 에러로 전파되지
//! 않습니다. [`ReconcilerError`]는 구성 단계 에러입니다.

use sbomsync_core::error::{ConfigError, SbomSyncError};

/// 조정 엔진 구성 에러
#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 필수 협력자 누락
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

impl From<ReconcilerError> for SbomSyncError {
    fn from(err: ReconcilerError) -> Self {
        match err {
            ReconcilerError::Config { field, reason } => {
                SbomSyncError::Config(ConfigError::InvalidValue { field, reason })
            }
            ReconcilerError::MissingCollaborator(name) => {
                SbomSyncError::Config(ConfigError::InvalidValue {
                    field: name.to_owned(),
                    reason: "must be provided".to_owned(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_collaborator_converts_to_config_error() {
        let err: SbomSyncError = ReconcilerError::MissingCollaborator("scanner").into();
        assert!(matches!(err, SbomSyncError::Config(_)));
        assert!(err.to_string().contains("scanner"));
    }
}
