//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수로 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `sbomsync_`
//! - 구성 요소: `scanner_`, `target_`, `reconciler_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 대상 이름 레이블 키
pub const LABEL_TARGET: &str = "target";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Scanner 메트릭 ────────────────────────────────────────────────

/// Scanner: 완료된 스캔 수 (counter, label: result)
pub const SCANNER_SCANS_TOTAL: &str = "sbomsync_scanner_scans_total";

/// Scanner: 스캔 소요 시간 (histogram, 초)
pub const SCANNER_SCAN_DURATION_SECONDS: &str = "sbomsync_scanner_scan_duration_seconds";

// ─── Target 메트릭 ─────────────────────────────────────────────────

/// Target: 업로드 수 (counter, labels: target, result)
pub const TARGET_UPLOADS_TOTAL: &str = "sbomsync_target_uploads_total";

/// Target: 제거된 항목 수 (counter, label: target)
pub const TARGET_ENTRIES_REMOVED_TOTAL: &str = "sbomsync_target_entries_removed_total";

/// Target: 인벤토리 조회 실패 수 (counter, label: target)
pub const TARGET_INVENTORY_FAILURES_TOTAL: &str = "sbomsync_target_inventory_failures_total";

// ─── Reconciler 메트릭 ─────────────────────────────────────────────

/// Reconciler: 전체 조정 패스 수 (counter)
pub const RECONCILER_FULL_PASSES_TOTAL: &str = "sbomsync_reconciler_full_passes_total";

/// Reconciler: 처리된 파드 이벤트 수 (counter)
pub const RECONCILER_EVENTS_TOTAL: &str = "sbomsync_reconciler_events_total";

/// Reconciler: 원장에 등록된 식별자 수 (gauge)
pub const RECONCILER_LEDGER_SIZE: &str = "sbomsync_reconciler_ledger_size";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 겹쳐서 건너뛴 cron 트리거 수 (counter)
pub const DAEMON_CRON_SKIPPED_TOTAL: &str = "sbomsync_daemon_cron_skipped_total";

/// Daemon: 빌드 정보 (gauge, 항상 1)
pub const DAEMON_BUILD_INFO: &str = "sbomsync_daemon_build_info";

/// 스캔 소요 시간 히스토그램 버킷 (초)
pub const SCAN_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 3600.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SCANNER_SCANS_TOTAL, "Total number of image scans by result");
    describe_histogram!(
        SCANNER_SCAN_DURATION_SECONDS,
        "Time to complete a single image scan in seconds"
    );

    describe_counter!(
        TARGET_UPLOADS_TOTAL,
        "Total number of SBOM uploads per target by result"
    );
    describe_counter!(
        TARGET_ENTRIES_REMOVED_TOTAL,
        "Total number of catalog entries removed per target"
    );
    describe_counter!(
        TARGET_INVENTORY_FAILURES_TOTAL,
        "Total number of failed inventory fetches per target"
    );

    describe_counter!(
        RECONCILER_FULL_PASSES_TOTAL,
        "Total number of full reconciliation passes"
    );
    describe_counter!(
        RECONCILER_EVENTS_TOTAL,
        "Total number of pod events handled"
    );
    describe_gauge!(
        RECONCILER_LEDGER_SIZE,
        "Number of image identities currently claimed in the dedup ledger"
    );

    describe_counter!(
        DAEMON_CRON_SKIPPED_TOTAL,
        "Cron triggers skipped because a pass was still running"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        SCANNER_SCANS_TOTAL,
        SCANNER_SCAN_DURATION_SECONDS,
        TARGET_UPLOADS_TOTAL,
        TARGET_ENTRIES_REMOVED_TOTAL,
        TARGET_INVENTORY_FAILURES_TOTAL,
        RECONCILER_FULL_PASSES_TOTAL,
        RECONCILER_EVENTS_TOTAL,
        RECONCILER_LEDGER_SIZE,
        DAEMON_CRON_SKIPPED_TOTAL,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("sbomsync_"),
                "Metric '{}' does not start with 'sbomsync_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn scan_duration_buckets_are_sorted() {
        for pair in SCAN_DURATION_BUCKETS.windows(2) {
            assert!(pair[1] > pair[0], "Bucket values must be in ascending order");
        }
    }
}
