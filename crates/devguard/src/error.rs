//! DevGuard 대상 에러 타입
//!
//! 카탈로그 작업 자체는 core의 [`CatalogError`](sbomsync_core::error::CatalogError)를
//! 반환합니다. [`DevGuardError`]는 대상 생성 단계(설정, HTTP 클라이언트)에서만 쓰입니다.

use sbomsync_core::error::{ConfigError, SbomSyncError};

/// DevGuard 대상 생성 에러
#[derive(Debug, thiserror::Error)]
pub enum DevGuardError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// HTTP 클라이언트 생성 실패
    #[error("failed to build http client: {0}")]
    Client(String),
}

impl From<DevGuardError> for SbomSyncError {
    fn from(err: DevGuardError) -> Self {
        match err {
            DevGuardError::Config { field, reason } => {
                SbomSyncError::Config(ConfigError::InvalidValue {
                    field: format!("devguard.{field}"),
                    reason,
                })
            }
            DevGuardError::Client(reason) => SbomSyncError::Config(ConfigError::InvalidValue {
                field: "devguard".to_owned(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_prefixed_field() {
        let err: SbomSyncError = DevGuardError::Config {
            field: "token".to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("devguard.token"), "{msg}");
    }

    #[test]
    fn client_error_display() {
        let err = DevGuardError::Client("bad tls".to_owned());
        assert_eq!(err.to_string(), "failed to build http client: bad tls");
    }
}
