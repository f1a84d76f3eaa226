//! DevGuard 대상 설정
//!
//! core의 [`DevGuardConfig`](sbomsync_core::config::DevGuardConfig)를 파싱된 형태
//! (조직/루트 프로젝트 분리, 제거 방식 enum)로 바꾼 것입니다.
//!
//! # 사용 예시
//!
//! ```
//! use sbomsync_devguard::{DevGuardTargetConfigBuilder, RemovalMode};
//!
//! let config = DevGuardTargetConfigBuilder::new()
//!     .api_url("https://api.devguard.example")
//!     .token("secret")
//!     .project_name("acme/projects/prod-cluster")
//!     .removal_mode(RemovalMode::Archive)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.organization, "acme");
//! assert_eq!(config.root_project, "prod-cluster");
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sbomsync_core::config::{DevGuardConfig, RootProjectRef};

use crate::error::DevGuardError;

/// 제거 대상 에셋/프로젝트 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalMode {
    /// HTTP DELETE
    #[default]
    Delete,
    /// PATCH `{"archived": true}`
    Archive,
}

impl FromStr for RemovalMode {
    type Err = DevGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "archive" => Ok(Self::Archive),
            other => Err(DevGuardError::Config {
                field: "removal_mode".to_owned(),
                reason: format!("unknown removal mode '{other}', expected delete or archive"),
            }),
        }
    }
}

impl fmt::Display for RemovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

/// DevGuard 대상 설정
#[derive(Debug, Clone)]
pub struct DevGuardTargetConfig {
    /// API 기본 URL (끝의 `/` 제거됨)
    pub api_url: String,
    /// 베어러 토큰
    pub token: String,
    /// 조직 슬러그
    pub organization: String,
    /// 루트 프로젝트 슬러그
    pub root_project: String,
    /// 에셋 이름 재정의 어노테이션 키 (빈 문자열이면 비활성)
    pub asset_name_annotation_key: String,
    /// 제거 방식
    pub removal_mode: RemovalMode,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// `X-Scanner` 헤더 값
    pub scanner_id: String,
}

impl DevGuardTargetConfig {
    /// core 설정에서 대상 설정을 생성합니다.
    ///
    /// # Errors
    ///
    /// `project_name`이 `<org>/projects/<project>` 형식이 아니거나 제거 방식을
    /// 알 수 없으면 에러를 반환합니다.
    pub fn from_core(core: &DevGuardConfig) -> Result<Self, DevGuardError> {
        let root = RootProjectRef::parse(&core.project_name).ok_or_else(|| {
            DevGuardError::Config {
                field: "project_name".to_owned(),
                reason: format!(
                    "'{}' must have the form <organization>/projects/<project>",
                    core.project_name
                ),
            }
        })?;

        let config = Self {
            api_url: core.api_url.trim().trim_end_matches('/').to_owned(),
            token: core.token.clone(),
            organization: root.organization,
            root_project: root.project,
            asset_name_annotation_key: core.asset_name_annotation_key.trim().to_owned(),
            removal_mode: core.removal_mode.parse()?,
            request_timeout_secs: core.request_timeout_secs,
            scanner_id: core.scanner_id.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DevGuardError> {
        if self.token.trim().is_empty() {
            return Err(DevGuardError::Config {
                field: "token".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.api_url.is_empty() {
            return Err(DevGuardError::Config {
                field: "api_url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(DevGuardError::Config {
                field: "api_url".to_owned(),
                reason: format!("'{}' must start with http:// or https://", self.api_url),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(DevGuardError::Config {
                field: "request_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// [`DevGuardTargetConfig`] 빌더
///
/// 기본값은 core `DevGuardConfig`의 기본값과 같습니다.
#[derive(Debug, Clone, Default)]
pub struct DevGuardTargetConfigBuilder {
    core: DevGuardConfig,
    removal_mode: Option<RemovalMode>,
}

impl DevGuardTargetConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// API 기본 URL
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.core.api_url = url.into();
        self
    }

    /// 베어러 토큰
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.core.token = token.into();
        self
    }

    /// 루트 프로젝트 (`<org>/projects/<project>`)
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.core.project_name = name.into();
        self
    }

    /// 에셋 이름 재정의 어노테이션 키
    pub fn asset_name_annotation_key(mut self, key: impl Into<String>) -> Self {
        self.core.asset_name_annotation_key = key.into();
        self
    }

    /// 제거 방식
    pub fn removal_mode(mut self, mode: RemovalMode) -> Self {
        self.removal_mode = Some(mode);
        self
    }

    /// 요청 타임아웃 (초)
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.core.request_timeout_secs = secs;
        self
    }

    /// 설정을 빌드합니다.
    pub fn build(self) -> Result<DevGuardTargetConfig, DevGuardError> {
        let mut config = DevGuardTargetConfig::from_core(&self.core)?;
        if let Some(mode) = self.removal_mode {
            config.removal_mode = mode;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> DevGuardConfig {
        DevGuardConfig {
            token: "t".to_owned(),
            project_name: "acme/projects/cluster".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn from_core_splits_root_project() {
        let config = DevGuardTargetConfig::from_core(&core()).unwrap();
        assert_eq!(config.organization, "acme");
        assert_eq!(config.root_project, "cluster");
        assert_eq!(config.removal_mode, RemovalMode::Delete);
    }

    #[test]
    fn from_core_rejects_malformed_project_name() {
        let mut core = core();
        core.project_name = "acme/cluster".to_owned();
        let err = DevGuardTargetConfig::from_core(&core).unwrap_err();
        assert!(err.to_string().contains("project_name"));
    }

    #[test]
    fn from_core_trims_trailing_slash() {
        let mut core = core();
        core.api_url = "http://localhost:8080/".to_owned();
        let config = DevGuardTargetConfig::from_core(&core).unwrap();
        assert_eq!(config.api_url, "http://localhost:8080");
    }

    #[test]
    fn removal_mode_parses_case_insensitively() {
        assert_eq!("ARCHIVE".parse::<RemovalMode>().unwrap(), RemovalMode::Archive);
        assert_eq!("delete".parse::<RemovalMode>().unwrap(), RemovalMode::Delete);
        assert!("purge".parse::<RemovalMode>().is_err());
    }

    #[test]
    fn validate_rejects_empty_token() {
        let mut core = core();
        core.token = "  ".to_owned();
        assert!(DevGuardTargetConfig::from_core(&core).is_err());
    }

    #[test]
    fn validate_rejects_non_http_url() {
        let mut core = core();
        core.api_url = "ftp://devguard".to_owned();
        let err = DevGuardTargetConfig::from_core(&core).unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn builder_overrides_removal_mode() {
        let config = DevGuardTargetConfigBuilder::new()
            .token("t")
            .project_name("acme/projects/c")
            .removal_mode(RemovalMode::Archive)
            .build()
            .unwrap();
        assert_eq!(config.removal_mode, RemovalMode::Archive);
        assert_eq!(config.removal_mode.to_string(), "archive");
    }
}
