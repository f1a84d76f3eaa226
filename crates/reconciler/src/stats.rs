//! 조정 통계 카운터

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 조정 엔진 카운터 (프로세스 수명 동안 누적)
#[derive(Debug, Default)]
pub struct ReconcilerStats {
    pub(crate) full_passes: AtomicU64,
    pub(crate) events_handled: AtomicU64,
    pub(crate) scans_succeeded: AtomicU64,
    pub(crate) scans_failed: AtomicU64,
    pub(crate) uploads_succeeded: AtomicU64,
    pub(crate) uploads_failed: AtomicU64,
    pub(crate) entries_removed: AtomicU64,
    pub(crate) removals_failed: AtomicU64,
    pub(crate) pods_marked: AtomicU64,
}

impl ReconcilerStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// 현재 값을 복사합니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            full_passes: load(&self.full_passes),
            events_handled: load(&self.events_handled),
            scans_succeeded: load(&self.scans_succeeded),
            scans_failed: load(&self.scans_failed),
            uploads_succeeded: load(&self.uploads_succeeded),
            uploads_failed: load(&self.uploads_failed),
            entries_removed: load(&self.entries_removed),
            removals_failed: load(&self.removals_failed),
            pods_marked: load(&self.pods_marked),
        }
    }
}

/// 통계 스냅샷 (`/status` 응답용)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub full_passes: u64,
    pub events_handled: u64,
    pub scans_succeeded: u64,
    pub scans_failed: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub entries_removed: u64,
    pub removals_failed: u64,
    pub pods_marked: u64,
}
