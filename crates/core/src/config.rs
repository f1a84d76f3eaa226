//! 설정 관리 — sbomsync.toml 파싱 및 런타임 설정
//!
//! [`SbomSyncConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SBOMSYNC_DEVGUARD_TOKEN=...` 형식)
//! 3. 설정 파일 (`sbomsync.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), sbomsync_core::error::SbomSyncError> {
//! use sbomsync_core::config::SbomSyncConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SbomSyncConfig::load("sbomsync.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SbomSyncConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SbomSyncError};
use crate::image::RegistryProxyMap;

/// sbomsync 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SbomSyncConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 클러스터 관찰 설정
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// 스캐너 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// DevGuard 카탈로그 설정
    #[serde(default)]
    pub devguard: DevGuardConfig,
    /// 데몬 구동 설정
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SbomSyncConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SbomSyncError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    ///
    /// 필수 자격 증명은 환경변수로 주입되는 경우가 많으므로 검증은
    /// 오버라이드 이후 호출자가 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SbomSyncError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SbomSyncError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SbomSyncError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SbomSyncError> {
        toml::from_str(toml_str).map_err(|e| {
            SbomSyncError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SBOMSYNC_{SECTION}_{FIELD}`
    /// 예: `SBOMSYNC_SCANNER_JOB_TIMEOUT_SECS=600`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SBOMSYNC_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SBOMSYNC_GENERAL_LOG_FORMAT");

        // Cluster
        override_string(
            &mut self.cluster.pod_label_selector,
            "SBOMSYNC_CLUSTER_POD_LABEL_SELECTOR",
        );
        override_string(
            &mut self.cluster.namespace_label_selector,
            "SBOMSYNC_CLUSTER_NAMESPACE_LABEL_SELECTOR",
        );
        override_bool(
            &mut self.cluster.ignore_annotations,
            "SBOMSYNC_CLUSTER_IGNORE_ANNOTATIONS",
        );
        override_string(
            &mut self.cluster.annotation_prefix,
            "SBOMSYNC_CLUSTER_ANNOTATION_PREFIX",
        );
        override_u64(
            &mut self.cluster.request_timeout_secs,
            "SBOMSYNC_CLUSTER_REQUEST_TIMEOUT_SECS",
        );

        // Scanner
        override_string(&mut self.scanner.trivy_path, "SBOMSYNC_SCANNER_TRIVY_PATH");
        override_u64(
            &mut self.scanner.job_timeout_secs,
            "SBOMSYNC_SCANNER_JOB_TIMEOUT_SECS",
        );
        override_csv(
            &mut self.scanner.registry_proxies,
            "SBOMSYNC_SCANNER_REGISTRY_PROXIES",
        );
        override_usize(
            &mut self.scanner.max_concurrent_scans,
            "SBOMSYNC_SCANNER_MAX_CONCURRENT_SCANS",
        );

        // DevGuard
        override_bool(&mut self.devguard.enabled, "SBOMSYNC_DEVGUARD_ENABLED");
        override_string(&mut self.devguard.api_url, "SBOMSYNC_DEVGUARD_API_URL");
        override_string(&mut self.devguard.token, "SBOMSYNC_DEVGUARD_TOKEN");
        override_string(
            &mut self.devguard.project_name,
            "SBOMSYNC_DEVGUARD_PROJECT_NAME",
        );
        override_string(
            &mut self.devguard.asset_name_annotation_key,
            "SBOMSYNC_DEVGUARD_ASSET_NAME_ANNOTATION_KEY",
        );
        override_string(
            &mut self.devguard.removal_mode,
            "SBOMSYNC_DEVGUARD_REMOVAL_MODE",
        );
        override_u64(
            &mut self.devguard.request_timeout_secs,
            "SBOMSYNC_DEVGUARD_REQUEST_TIMEOUT_SECS",
        );

        // Daemon
        override_string(&mut self.daemon.cron, "SBOMSYNC_DAEMON_CRON");
        override_string(
            &mut self.daemon.health_listen_addr,
            "SBOMSYNC_DAEMON_HEALTH_LISTEN_ADDR",
        );
        override_u16(&mut self.daemon.health_port, "SBOMSYNC_DAEMON_HEALTH_PORT");
        override_u64(
            &mut self.daemon.shutdown_timeout_secs,
            "SBOMSYNC_DAEMON_SHUTDOWN_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "SBOMSYNC_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "SBOMSYNC_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "SBOMSYNC_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 여기서 반환되는 에러만이 시작 시점에 치명적입니다.
    pub fn validate(&self) -> Result<(), SbomSyncError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.scanner.job_timeout_secs == 0 {
            return Err(invalid(
                "scanner.job_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.scanner.max_concurrent_scans == 0 {
            return Err(invalid(
                "scanner.max_concurrent_scans",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.scanner.trivy_path.is_empty() {
            return Err(invalid(
                "scanner.trivy_path",
                "must not be empty".to_owned(),
            ));
        }

        RegistryProxyMap::parse(&self.scanner.registry_proxies).map_err(|reason| {
            SbomSyncError::Config(ConfigError::InvalidValue {
                field: "scanner.registry_proxies".to_owned(),
                reason,
            })
        })?;

        if self.devguard.enabled {
            if self.devguard.token.is_empty() {
                return Err(invalid(
                    "devguard.token",
                    "token is required when devguard is enabled".to_owned(),
                ));
            }
            if self.devguard.api_url.is_empty() {
                return Err(invalid(
                    "devguard.api_url",
                    "must not be empty when devguard is enabled".to_owned(),
                ));
            }
            if RootProjectRef::parse(&self.devguard.project_name).is_none() {
                return Err(invalid(
                    "devguard.project_name",
                    format!(
                        "'{}' must have the form <org>/projects/<project>",
                        self.devguard.project_name
                    ),
                ));
            }
            let valid_modes = ["delete", "archive"];
            if !valid_modes.contains(&self.devguard.removal_mode.as_str()) {
                return Err(invalid(
                    "devguard.removal_mode",
                    format!("must be one of: {}", valid_modes.join(", ")),
                ));
            }
        }

        if self.daemon.health_port == 0 {
            return Err(invalid("daemon.health_port", "must not be 0".to_owned()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must not be 0".to_owned()));
        }

        Ok(())
    }

    /// 설정에 명시된 레지스트리 프록시 매핑
    pub fn registry_proxy_map(&self) -> Result<RegistryProxyMap, SbomSyncError> {
        RegistryProxyMap::parse(&self.scanner.registry_proxies).map_err(|reason| {
            SbomSyncError::Config(ConfigError::InvalidValue {
                field: "scanner.registry_proxies".to_owned(),
                reason,
            })
        })
    }
}

fn invalid(field: &str, reason: String) -> SbomSyncError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 클러스터 관찰 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// 파드 레이블 셀렉터 (빈 문자열이면 전체)
    pub pod_label_selector: String,
    /// 네임스페이스 레이블 셀렉터 (빈 문자열이면 전체)
    pub namespace_label_selector: String,
    /// 처리 완료 어노테이션을 기록하지 않음
    pub ignore_annotations: bool,
    /// 처리 완료 어노테이션 키 접두어
    pub annotation_prefix: String,
    /// 클러스터 API 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pod_label_selector: String::new(),
            namespace_label_selector: String::new(),
            ignore_annotations: false,
            annotation_prefix: "sbomsync.io".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// trivy 실행 파일 경로
    pub trivy_path: String,
    /// 이미지 하나당 스캔 제한 시간 (초)
    pub job_timeout_secs: u64,
    /// 레지스트리 프록시 매핑 (`registry.io=proxy.local`)
    pub registry_proxies: Vec<String>,
    /// 동시에 스캔할 수 있는 파드 수
    pub max_concurrent_scans: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            trivy_path: "trivy".to_owned(),
            job_timeout_secs: 3600,
            registry_proxies: Vec::new(),
            max_concurrent_scans: 4,
        }
    }
}

/// DevGuard 카탈로그 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevGuardConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// API 기본 URL
    pub api_url: String,
    /// API 토큰
    pub token: String,
    /// 루트 프로젝트 (`<org>/projects/<project>`)
    pub project_name: String,
    /// 에셋 이름 재정의 어노테이션 키 (빈 문자열이면 비활성)
    pub asset_name_annotation_key: String,
    /// 제거 방식 (delete, archive)
    pub removal_mode: String,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 업로드 시 `X-Scanner` 헤더 값
    pub scanner_id: String,
}

impl Default for DevGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.main.devguard.org".to_owned(),
            token: String::new(),
            project_name: String::new(),
            asset_name_annotation_key: String::new(),
            removal_mode: "delete".to_owned(),
            request_timeout_secs: 30,
            scanner_id: "github.com/l3montree-dev/devguard-operator".to_owned(),
        }
    }
}

/// 루트 프로젝트 식별자 `<org>/projects/<project>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootProjectRef {
    /// 조직 슬러그
    pub organization: String,
    /// 프로젝트 슬러그
    pub project: String,
}

impl RootProjectRef {
    /// 식별자를 파싱합니다. 형식이 맞지 않으면 `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('/');
        let organization = parts.next()?;
        let marker = parts.next()?;
        let project = parts.next()?;
        if parts.next().is_some()
            || marker != "projects"
            || organization.is_empty()
            || project.is_empty()
        {
            return None;
        }
        Some(Self {
            organization: organization.to_owned(),
            project: project.to_owned(),
        })
    }
}

/// 데몬 구동 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// 주기 실행 cron 표현식 (빈 문자열이면 watch 모드)
    pub cron: String,
    /// 헬스 체크 바인드 주소
    pub health_listen_addr: String,
    /// 헬스 체크 포트
    pub health_port: u16,
    /// 종료 시 진행 중 작업 대기 시간 (초)
    pub shutdown_timeout_secs: u64,
}

impl DaemonConfig {
    /// 앞뒤 따옴표를 제거한 cron 표현식. 비어 있으면 `None`.
    pub fn cron_expression(&self) -> Option<String> {
        let trimmed = self.cron.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cron: String::new(),
            health_listen_addr: "0.0.0.0".to_owned(),
            health_port: 8081,
            shutdown_timeout_secs: 30,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SbomSyncConfig {
        let mut config = SbomSyncConfig::default();
        config.devguard.token = "secret".to_owned();
        config.devguard.project_name = "acme/projects/cluster-a".to_owned();
        config
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = SbomSyncConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.scanner.job_timeout_secs, 3600);
        assert_eq!(config.daemon.health_port, 8081);
        assert!(config.devguard.enabled);
        assert!(!config.metrics.enabled);
        assert!(config.daemon.cron_expression().is_none());
    }

    #[test]
    fn default_config_requires_devguard_token() {
        let err = SbomSyncConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("devguard.token"));
    }

    #[test]
    fn config_with_credentials_passes_validation() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn disabled_devguard_skips_credential_checks() {
        let mut config = SbomSyncConfig::default();
        config.devguard.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml_str = r#"
[cluster]
pod_label_selector = "app=web"

[scanner]
registry_proxies = ["registry.io=proxy.local"]
"#;
        let config = SbomSyncConfig::parse(toml_str).unwrap();
        assert_eq!(config.cluster.pod_label_selector, "app=web");
        assert_eq!(config.cluster.annotation_prefix, "sbomsync.io");
        assert_eq!(config.scanner.registry_proxies.len(), 1);
        assert_eq!(config.scanner.trivy_path, "trivy");
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = SbomSyncConfig::parse("[general\nlog_level = ").unwrap_err();
        assert!(matches!(
            err,
            SbomSyncError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = valid_config();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_legacy_project_name_form() {
        let mut config = valid_config();
        config.devguard.project_name = "acme/cluster-a".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("project_name"));
    }

    #[test]
    fn validate_rejects_malformed_proxy_entry() {
        let mut config = valid_config();
        config.scanner.registry_proxies = vec!["registry.io".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registry_proxies"));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = valid_config();
        config.scanner.job_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_removal_mode() {
        let mut config = valid_config();
        config.devguard.removal_mode = "purge".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("removal_mode"));
    }

    #[test]
    fn root_project_ref_parses_org_and_project() {
        let parsed = RootProjectRef::parse("acme/projects/cluster-a").unwrap();
        assert_eq!(parsed.organization, "acme");
        assert_eq!(parsed.project, "cluster-a");

        assert!(RootProjectRef::parse("acme/cluster-a").is_none());
        assert!(RootProjectRef::parse("acme/projects/").is_none());
        assert!(RootProjectRef::parse("acme/projects/a/b").is_none());
        assert!(RootProjectRef::parse("").is_none());
    }

    #[test]
    fn cron_expression_strips_quotes() {
        let config = DaemonConfig {
            cron: "\"0 */5 * * * *\"".to_owned(),
            ..Default::default()
        };
        assert_eq!(config.cron_expression().as_deref(), Some("0 */5 * * * *"));

        let config = DaemonConfig {
            cron: "  ".to_owned(),
            ..Default::default()
        };
        assert!(config.cron_expression().is_none());
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_SBOMSYNC_STR", "overridden") };
        override_string(&mut val, "TEST_SBOMSYNC_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_SBOMSYNC_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_SBOMSYNC_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_SBOMSYNC_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_SBOMSYNC_BOOL_BAD") };
    }

    #[test]
    fn env_override_csv_skips_empty_items() {
        let mut val = vec!["a=b".to_owned()];
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_SBOMSYNC_CSV", "x=y, ,z=w") };
        override_csv(&mut val, "TEST_SBOMSYNC_CSV");
        assert_eq!(val, vec!["x=y", "z=w"]);
        unsafe { std::env::remove_var("TEST_SBOMSYNC_CSV") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = valid_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = SbomSyncConfig::parse(&toml_str).unwrap();
        assert_eq!(config.devguard.project_name, parsed.devguard.project_name);
        assert_eq!(config.daemon.health_port, parsed.daemon.health_port);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = SbomSyncConfig::from_file("/nonexistent/path/sbomsync.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SbomSyncError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
