//! 에러 타입 — 도메인별 에러 정의
//!
//! 개별 항목 처리 중 발생한 에러(파싱, 스캔, 카탈로그 전송)는 로그로 남기고
//! 다음 항목으로 진행합니다. 시작 시점의 [`ConfigError`]만 치명적입니다.

/// sbomsync 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SbomSyncError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이미지 참조 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ImageParseError),

    /// 스캐너 실행 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// 원격 카탈로그 에러
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// 클러스터 API 에러
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 이미지 참조 파싱 에러 (ParseFailure)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed image reference '{reference}': {reason}")]
pub struct ImageParseError {
    /// 원본 이미지 참조
    pub reference: String,
    /// 실패 사유
    pub reason: String,
}

/// 스캐너 실행 에러 (ScanFailure)
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 스캐너 프로세스를 시작하지 못함
    #[error("failed to spawn scanner '{binary}': {reason}")]
    Spawn { binary: String, reason: String },

    /// 0이 아닌 종료 코드
    #[error("scanner exited with {status} for '{image}': {stderr}")]
    ExitStatus {
        image: String,
        status: String,
        stderr: String,
    },

    /// 제한 시간 초과
    #[error("scan of '{image}' timed out after {timeout_secs}s")]
    Timeout { image: String, timeout_secs: u64 },

    /// 빈 출력
    #[error("scanner produced empty output for '{image}'")]
    EmptyOutput { image: String },

    /// 형식이 잘못된 출력
    #[error("scanner produced malformed output for '{image}': {reason}")]
    MalformedOutput { image: String, reason: String },

    /// 임시 파일 등 I/O 실패
    #[error("scanner io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 원격 카탈로그 에러
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// 리소스가 존재하지 않음 (CatalogNotFound, create-if-absent 흐름에서 예상됨)
    #[error("catalog resource not found: {resource}")]
    NotFound { resource: String },

    /// 네트워크/전송 실패 (CatalogTransportFailure)
    #[error("catalog transport failure on {operation}: {reason}")]
    Transport { operation: String, reason: String },

    /// 예상하지 못한 HTTP 상태 코드
    #[error("catalog returned status {status} for {operation}")]
    Status { operation: String, status: u16 },

    /// 응답 디코딩 실패
    #[error("failed to decode catalog response for {operation}: {reason}")]
    Decode { operation: String, reason: String },

    /// 인벤토리 조회 실패 (InventoryFetchFailure)
    #[error("inventory fetch failed: {reason}")]
    InventoryFetch { reason: String },

    /// 대상 초기화 실패
    #[error("target '{target}' is not initialized")]
    NotInitialized { target: String },
}

impl CatalogError {
    /// NotFound 여부
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// 클러스터 API 에러
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// 클라이언트 연결 실패
    #[error("cluster connection failed: {0}")]
    Connection(String),

    /// API 요청 실패
    #[error("cluster api request '{operation}' failed: {reason}")]
    Api { operation: String, reason: String },

    /// watch 스트림 에러
    #[error("pod watch failed: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: SbomSyncError = ConfigError::InvalidValue {
            field: "devguard.token".to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into();
        assert!(matches!(err, SbomSyncError::Config(_)));
        assert!(err.to_string().contains("devguard.token"));
    }

    #[test]
    fn not_found_is_detected() {
        let err = CatalogError::NotFound {
            resource: "project ns1".to_owned(),
        };
        assert!(err.is_not_found());

        let err = CatalogError::Status {
            operation: "get project".to_owned(),
            status: 500,
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn scan_timeout_display_includes_image() {
        let err = ScanError::Timeout {
            image: "registry.io/app:1.0".to_owned(),
            timeout_secs: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("registry.io/app:1.0"));
        assert!(msg.contains("30s"));
    }
}
