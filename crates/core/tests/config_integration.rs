//! sbomsync.toml 통합 설정 테스트
//!
//! - sbomsync.toml.example 파싱 테스트
//! - 파일 로딩 + 환경변수 우선순위 테스트

use std::io::Write;

use sbomsync_core::config::SbomSyncConfig;
use sbomsync_core::error::{ConfigError, SbomSyncError};
use serial_test::serial;

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../sbomsync.toml.example");
    let config = SbomSyncConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.scanner.job_timeout_secs, 3600);
    assert_eq!(config.daemon.health_port, 8081);
    assert_eq!(config.devguard.project_name, "my-org/projects/my-cluster");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../sbomsync.toml.example");
    let config = SbomSyncConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn empty_file_uses_defaults() {
    let config = SbomSyncConfig::parse("").expect("empty toml should parse");
    assert_eq!(config.cluster.annotation_prefix, "sbomsync.io");
    assert!(config.daemon.cron_expression().is_none());
}

#[test]
fn wrong_type_is_parse_error() {
    let err = SbomSyncConfig::parse("[daemon]\nhealth_port = \"eighty\"").unwrap_err();
    assert!(matches!(
        err,
        SbomSyncError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
#[serial]
async fn env_overrides_file_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[devguard]
token = "from-file"
project_name = "acme/projects/cluster-a"

[daemon]
cron = "0 0 * * * *"
"#
    )
    .unwrap();

    // SAFETY: serial 테스트이므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
    unsafe { std::env::set_var("SBOMSYNC_DEVGUARD_TOKEN", "from-env") };
    let config = SbomSyncConfig::load(file.path()).await;
    unsafe { std::env::remove_var("SBOMSYNC_DEVGUARD_TOKEN") };

    let config = config.expect("config should load");
    assert_eq!(config.devguard.token, "from-env");
    assert_eq!(config.daemon.cron_expression().as_deref(), Some("0 0 * * * *"));
}

#[tokio::test]
#[serial]
async fn load_fails_validation_without_token() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[devguard]\nproject_name = \"acme/projects/cluster-a\"").unwrap();

    let err = SbomSyncConfig::load(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("devguard.token"));
}
