//! 조정 엔진 -- 클러스터 이미지와 원격 카탈로그 인벤토리를 맞춥니다.
//!
//! [`Reconciler`]는 스캐너, 파드 표시기, 카탈로그 대상 목록, 중복 방지 원장을
//! 묶어 두 가지 진입점을 제공합니다.
//!
//! # 전체 조정 패스
//! ```text
//! pods ──> live identities ──┬──> inventory(T1) ──> remove(inventory - live)
//!                            ├──> inventory(T2) ──> remove(...)
//!                            └──> pods with missing identities ──> scan_pod*
//! ```
//!
//! # 증분 이벤트
//! ```text
//! Added(pod)          ──> scan_pod(pod)
//! Updated(old, new)   ──> diff ──> removed: orphan check ──> remove + release
//!                              └─> added:   scan
//! Deleted(pod)        ──> orphan check on every container ──> remove + release
//! ```
//!
//! 컨테이너 스캔은 원장의 `try_claim`을 통과한 경우에만 실행되며 세마포어로
//! 동시 실행 수가 제한됩니다.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use sbomsync_core::error::CatalogError;
use sbomsync_core::image::ImageReference;
use sbomsync_core::marker::PodMarker;
use sbomsync_core::metrics as m;
use sbomsync_core::pipeline::HealthStatus;
use sbomsync_core::scan::ImageScanner;
use sbomsync_core::target::DynCatalogTarget;
use sbomsync_core::types::{
    ContainerObservation, ImageIdentity, Inventory, PodSnapshot, ScanResult, TargetInventoryEntry,
};

use crate::config::ReconcilerConfig;
use crate::diff::{diff_containers, orphaned_identities};
use crate::error::ReconcilerError;
use crate::ledger::{ClaimState, DedupLedger};
use crate::stats::{ReconcilerStats, StatsSnapshot};

/// 카탈로그 대상과 초기화 결과
struct TargetSlot {
    target: Arc<dyn DynCatalogTarget>,
    health: RwLock<HealthStatus>,
}

impl TargetSlot {
    fn health(&self) -> HealthStatus {
        self.health
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_health(&self, status: HealthStatus) {
        *self.health.write().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

/// 대상 하나의 상태 (`/status` 응답용)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TargetStatus {
    /// 대상 이름
    pub name: String,
    /// 초기화 결과
    pub health: HealthStatus,
}

/// 파드 하나의 스캔 결과 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodScanOutcome {
    /// 모든 대상에 업로드된 컨테이너 수
    pub uploaded: usize,
    /// 원장 점유 실패 또는 잘못된 참조로 건너뛴 컨테이너 수
    pub skipped: usize,
    /// 건너뛴 컨테이너 중 다른 파드의 점유가 아직 `Registered`가 아닌 수
    pub deferred: usize,
    /// 스캔 또는 업로드에 실패한 컨테이너 수
    pub failed: usize,
    /// 처리 완료 표시 여부
    pub marked: bool,
}

/// 전체 조정 패스 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// 관찰한 파드 수
    pub pods: usize,
    /// 실행 중인 식별자 수
    pub live_identities: usize,
    /// 인벤토리 조회에 실패한 대상 수
    pub inventory_failures: usize,
    /// 제거된 항목 수 (모든 대상 합계)
    pub removed: usize,
    /// 제거에 실패한 항목 수
    pub removal_failures: usize,
    /// 스캔 대상으로 선정된 파드 수
    pub pods_scheduled: usize,
    /// 업로드된 컨테이너 수
    pub uploaded: usize,
    /// 실패한 컨테이너 수
    pub failed: usize,
}

/// 조정 엔진
pub struct Reconciler<S: ImageScanner, M: PodMarker> {
    config: ReconcilerConfig,
    scanner: Arc<S>,
    marker: Arc<M>,
    targets: Vec<TargetSlot>,
    ledger: Arc<DedupLedger>,
    scan_permits: Semaphore,
    stats: ReconcilerStats,
}

impl<S: ImageScanner, M: PodMarker> Reconciler<S, M> {
    /// 설정을 반환합니다.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// 공유 원장
    pub fn ledger(&self) -> Arc<DedupLedger> {
        Arc::clone(&self.ledger)
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 대상별 상태
    pub fn target_statuses(&self) -> Vec<TargetStatus> {
        self.targets
            .iter()
            .map(|slot| TargetStatus {
                name: slot.target.name().to_owned(),
                health: slot.health(),
            })
            .collect()
    }

    /// 전체 상태
    ///
    /// 모든 대상이 정상이면 Healthy, 일부만 정상이면 Degraded,
    /// 정상인 대상이 없으면 Unhealthy입니다.
    pub fn health(&self) -> HealthStatus {
        let statuses = self.target_statuses();
        let healthy = statuses.iter().filter(|s| s.health.is_healthy()).count();
        if healthy == statuses.len() {
            HealthStatus::Healthy
        } else if healthy > 0 {
            HealthStatus::Degraded(format!(
                "{} of {} targets unavailable",
                statuses.len() - healthy,
                statuses.len()
            ))
        } else {
            HealthStatus::Unhealthy("no catalog target available".to_owned())
        }
    }

    fn active_targets(&self) -> Vec<Arc<dyn DynCatalogTarget>> {
        self.targets
            .iter()
            .filter(|slot| slot.health().is_healthy())
            .map(|slot| Arc::clone(&slot.target))
            .collect()
    }

    /// 모든 대상을 초기화하고 사용 가능한 대상 수를 반환합니다.
    ///
    /// 실패한 대상은 다음 초기화까지 모든 작업에서 제외됩니다.
    pub async fn initialize_targets(&self) -> usize {
        let results = join_all(self.targets.iter().map(|slot| async move {
            (slot, slot.target.initialize().await)
        }))
        .await;

        let mut available = 0;
        for (slot, result) in results {
            match result {
                Ok(()) => {
                    slot.set_health(HealthStatus::Healthy);
                    available += 1;
                }
                Err(e) => {
                    error!(catalog = slot.target.name(), error = %e, "catalog target initialization failed, target disabled for this run");
                    slot.set_health(HealthStatus::Unhealthy(e.to_string()));
                }
            }
        }
        info!(available, configured = self.targets.len(), "catalog targets initialized");
        available
    }

    /// 전체 조정 패스를 실행합니다.
    ///
    /// 1. 실패 상태의 점유를 해제합니다.
    /// 2. 대상별 인벤토리를 동시에 조회합니다.
    /// 3. 실행 중이 아닌 항목을 제거합니다. 조회에 실패한 네임스페이스는 제외합니다.
    /// 4. 식별자가 하나라도 빠진 파드를 스캔합니다.
    pub async fn full_pass(&self, pods: &[PodSnapshot]) -> PassReport {
        let started = Instant::now();
        ReconcilerStats::incr(&self.stats.full_passes);
        metrics::counter!(m::RECONCILER_FULL_PASSES_TOTAL).increment(1);

        let retried = self.ledger.release_failed();
        if retried > 0 {
            debug!(count = retried, "released failed claims for retry");
        }

        let live: HashSet<&ImageIdentity> = pods.iter().flat_map(|p| p.identities()).collect();
        let mut report = PassReport {
            pods: pods.len(),
            live_identities: live.len(),
            ..Default::default()
        };

        let targets = self.active_targets();
        if targets.is_empty() {
            warn!("no catalog target available, skipping reconciliation pass");
            return report;
        }

        let inventories = join_all(targets.iter().map(|target| async move {
            (target, target.load_inventory().await)
        }))
        .await;

        let mut loaded: Vec<Inventory> = Vec::with_capacity(inventories.len());
        for (target, inventory) in inventories {
            match inventory {
                Ok(inventory) => {
                    for namespace in &inventory.failed_namespaces {
                        metrics::counter!(m::TARGET_INVENTORY_FAILURES_TOTAL, m::LABEL_TARGET => target.name().to_owned()).increment(1);
                        warn!(catalog = target.name(), namespace = %namespace, "inventory incomplete, namespace excluded from removal");
                    }
                    let (removed, failed) = self.remove_orphans(target.as_ref(), &inventory, &live).await;
                    report.removed += removed;
                    report.removal_failures += failed;
                    loaded.push(inventory);
                }
                Err(e) => {
                    report.inventory_failures += 1;
                    metrics::counter!(m::TARGET_INVENTORY_FAILURES_TOTAL, m::LABEL_TARGET => target.name().to_owned()).increment(1);
                    error!(catalog = target.name(), error = %e, "could not load inventory, target skipped for this pass");
                }
            }
        }

        let to_scan = self.pods_missing_from(pods, &loaded);
        report.pods_scheduled = to_scan.len();

        let outcomes = join_all(to_scan.iter().map(|pod| self.scan_pod(pod))).await;
        for outcome in outcomes {
            report.uploaded += outcome.uploaded;
            report.failed += outcome.failed;
        }

        info!(
            pods = report.pods,
            live = report.live_identities,
            removed = report.removed,
            scheduled = report.pods_scheduled,
            uploaded = report.uploaded,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation pass finished"
        );
        report
    }

    /// 인벤토리에서 실행 중이 아닌 항목을 제거하고 (제거, 실패) 수를 반환합니다.
    async fn remove_orphans(
        &self,
        target: &dyn DynCatalogTarget,
        inventory: &Inventory,
        live: &HashSet<&ImageIdentity>,
    ) -> (usize, usize) {
        let to_remove: Vec<TargetInventoryEntry> = inventory
            .entries()
            .filter(|e| !live.contains(&e.identity))
            .filter(|e| inventory.is_namespace_complete(&e.namespace))
            .cloned()
            .collect();
        if to_remove.is_empty() {
            return (0, 0);
        }

        info!(catalog = target.name(), count = to_remove.len(), "removing entries no longer running");
        let counts = self.remove_from(target, &to_remove).await;
        for entry in &to_remove {
            self.ledger.release(&entry.identity);
        }
        counts
    }

    async fn remove_from(
        &self,
        target: &dyn DynCatalogTarget,
        entries: &[TargetInventoryEntry],
    ) -> (usize, usize) {
        match target.remove(entries).await {
            Ok(report) => {
                ReconcilerStats::add(&self.stats.entries_removed, report.removed);
                ReconcilerStats::add(&self.stats.removals_failed, report.failed);
                metrics::counter!(m::TARGET_ENTRIES_REMOVED_TOTAL, m::LABEL_TARGET => target.name().to_owned())
                    .increment(report.removed as u64);
                if !report.emptied_namespaces.is_empty() {
                    info!(catalog = target.name(), namespaces = ?report.emptied_namespaces, "empty namespace groups removed");
                }
                (report.removed, report.failed)
            }
            Err(e) => {
                ReconcilerStats::add(&self.stats.removals_failed, entries.len());
                warn!(catalog = target.name(), error = %e, "removal failed");
                (0, entries.len())
            }
        }
    }

    /// 어느 대상의 인벤토리에든 식별자가 빠진 파드
    ///
    /// 온전히 조회된 네임스페이스에서 빠진 식별자가 `Registered`로 남아 있으면
    /// 원격에서 지워진 것이므로 점유를 풀어 다시 업로드합니다.
    fn pods_missing_from<'p>(&self, pods: &'p [PodSnapshot], inventories: &[Inventory]) -> Vec<&'p PodSnapshot> {
        let mut scheduled = HashSet::new();
        let mut to_scan = Vec::new();
        for pod in pods {
            let mut missing = false;
            for identity in pod.identities() {
                for inventory in inventories {
                    if inventory.contains_identity(identity) {
                        continue;
                    }
                    missing = true;
                    if inventory.is_namespace_complete(&identity.namespace)
                        && self.ledger.release_registered(identity)
                    {
                        debug!(identity = %identity, "registered image missing from catalog, scheduling re-upload");
                    }
                }
            }
            if missing && scheduled.insert(pod.key()) {
                to_scan.push(pod);
            }
        }
        to_scan
    }

    /// 파드가 추가되었을 때 호출합니다.
    pub async fn handle_added(&self, pod: &PodSnapshot) -> PodScanOutcome {
        self.count_event("added");
        debug!(pod = %pod.key(), containers = pod.containers.len(), "pod added");
        self.scan_pod(pod).await
    }

    /// 파드가 갱신되었을 때 호출합니다.
    ///
    /// 제거를 먼저 적용한 뒤 추가된 컨테이너를 스캔합니다. `cache`는 현재 캐시된
    /// 모든 파드이며 `new`를 포함해도 됩니다.
    pub async fn handle_updated(
        &self,
        old: &PodSnapshot,
        new: &PodSnapshot,
        cache: &[PodSnapshot],
    ) -> PodScanOutcome {
        self.count_event("updated");
        let diff = diff_containers(old, new);
        if diff.is_empty() {
            return PodScanOutcome::default();
        }
        debug!(pod = %new.key(), added = diff.added.len(), removed = diff.removed.len(), "pod containers changed");

        let added_refs: HashSet<&str> = diff.added.iter().map(|c| c.image_reference.as_str()).collect();
        let retained: Vec<&ContainerObservation> = new
            .containers
            .iter()
            .filter(|c| !added_refs.contains(c.image_reference.as_str()))
            .collect();
        let orphans = orphaned_identities(&diff.removed, &retained, cache, &new.key());
        self.remove_everywhere(&orphans).await;

        self.scan_containers(new, &diff.added).await
    }

    /// 파드가 삭제되었을 때 호출합니다. `pod`는 마지막으로 알려진 스냅샷입니다.
    pub async fn handle_deleted(&self, pod: &PodSnapshot, cache: &[PodSnapshot]) -> usize {
        self.count_event("deleted");
        let orphans = orphaned_identities(&pod.containers, &[], cache, &pod.key());
        debug!(pod = %pod.key(), orphans = orphans.len(), "pod deleted");
        self.remove_everywhere(&orphans).await
    }

    fn count_event(&self, kind: &'static str) {
        ReconcilerStats::incr(&self.stats.events_handled);
        metrics::counter!(m::RECONCILER_EVENTS_TOTAL, "kind" => kind).increment(1);
    }

    /// 모든 대상에서 식별자를 제거하고 점유를 해제합니다. 제거된 항목 수를 반환합니다.
    async fn remove_everywhere(&self, identities: &[ImageIdentity]) -> usize {
        if identities.is_empty() {
            return 0;
        }
        let entries: Vec<TargetInventoryEntry> = identities
            .iter()
            .cloned()
            .map(TargetInventoryEntry::from_identity)
            .collect();

        info!(identities = ?identities.iter().map(ToString::to_string).collect::<Vec<_>>(), "images no longer running, removing from catalogs");
        let targets = self.active_targets();
        let removed = join_all(targets.iter().map(|t| self.remove_from(t.as_ref(), &entries))).await;

        for identity in identities {
            self.ledger.release(identity);
        }
        removed.into_iter().map(|(ok, _)| ok).sum()
    }

    /// 파드의 모든 컨테이너를 스캔하고 업로드합니다.
    pub async fn scan_pod(&self, pod: &PodSnapshot) -> PodScanOutcome {
        self.scan_containers(pod, &pod.containers).await
    }

    /// 주어진 컨테이너를 순서대로 스캔하고 업로드합니다.
    ///
    /// 컨테이너 하나의 실패는 나머지를 막지 않습니다. 실패가 없고 컨테이너가
    /// 하나 이상이면 파드에 처리 완료 표시를 남깁니다. 다른 파드가 점유한
    /// 이미지가 아직 등록되지 않았으면 표시하지 않습니다.
    async fn scan_containers(&self, pod: &PodSnapshot, containers: &[ContainerObservation]) -> PodScanOutcome {
        let mut outcome = PodScanOutcome::default();
        if containers.is_empty() {
            return outcome;
        }

        let targets = self.active_targets();
        if targets.is_empty() {
            debug!(pod = %pod.key(), "no catalog target available, not scanning");
            outcome.skipped = containers.len();
            return outcome;
        }

        for container in containers {
            if let Err(e) = ImageReference::parse(&container.image_reference) {
                warn!(pod = %pod.key(), container = %container.container_name, error = %e, "skipping container with malformed image reference");
                outcome.skipped += 1;
                continue;
            }

            if !self.ledger.try_claim(&container.identity) {
                outcome.skipped += 1;
                let state = self.ledger.state(&container.identity);
                if state != Some(ClaimState::Registered) {
                    outcome.deferred += 1;
                }
                debug!(identity = %container.identity, state = state.map_or("released", |s| s.as_str()), "image already claimed, skipping");
                continue;
            }

            let sbom = {
                let _permit = self.scan_permits.acquire().await;
                self.scanner.scan(&container.image_reference).await
            };

            let sbom = match sbom {
                Ok(sbom) => {
                    ReconcilerStats::incr(&self.stats.scans_succeeded);
                    sbom
                }
                Err(e) => {
                    ReconcilerStats::incr(&self.stats.scans_failed);
                    warn!(pod = %pod.key(), image = %container.image_reference, error = %e, "scan failed, will retry on next pass");
                    self.ledger.complete(&container.identity, false);
                    outcome.failed += 1;
                    continue;
                }
            };

            let result = ScanResult::from_observation(container, sbom);
            let uploaded = self.upload_everywhere(&targets, &result).await;
            self.ledger.complete(&container.identity, uploaded);
            if uploaded {
                outcome.uploaded += 1;
            } else {
                outcome.failed += 1;
            }
        }

        if outcome.failed == 0 && outcome.deferred == 0 && self.config.mark_processed {
            match self.marker.mark_processed(pod).await {
                Ok(()) => {
                    outcome.marked = true;
                    ReconcilerStats::incr(&self.stats.pods_marked);
                }
                Err(e) => warn!(pod = %pod.key(), error = %e, "could not mark pod as processed"),
            }
        }
        outcome
    }

    /// 모든 대상에 업로드합니다. 하나라도 실패하면 `false`.
    async fn upload_everywhere(&self, targets: &[Arc<dyn DynCatalogTarget>], result: &ScanResult) -> bool {
        let results: Vec<(&str, Result<(), CatalogError>)> = join_all(
            targets
                .iter()
                .map(|t| async move { (t.name(), t.upload(result).await) }),
        )
        .await;

        let mut all_ok = true;
        for (name, outcome) in results {
            let label = match &outcome {
                Ok(()) => {
                    ReconcilerStats::incr(&self.stats.uploads_succeeded);
                    "success"
                }
                Err(e) => {
                    ReconcilerStats::incr(&self.stats.uploads_failed);
                    warn!(catalog = name, image = %result.image_reference, error = %e, "upload failed");
                    all_ok = false;
                    "failure"
                }
            };
            metrics::counter!(m::TARGET_UPLOADS_TOTAL, m::LABEL_TARGET => name.to_owned(), m::LABEL_RESULT => label).increment(1);
        }
        all_ok
    }
}

/// [`Reconciler`] 빌더
pub struct ReconcilerBuilder<S: ImageScanner, M: PodMarker> {
    config: ReconcilerConfig,
    scanner: Option<Arc<S>>,
    marker: Option<Arc<M>>,
    targets: Vec<Arc<dyn DynCatalogTarget>>,
    ledger: Option<Arc<DedupLedger>>,
}

impl<S: ImageScanner, M: PodMarker> Default for ReconcilerBuilder<S, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ImageScanner, M: PodMarker> ReconcilerBuilder<S, M> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ReconcilerConfig::default(),
            scanner: None,
            marker: None,
            targets: Vec::new(),
            ledger: None,
        }
    }

    /// 설정을 지정합니다.
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// 스캐너를 지정합니다.
    pub fn scanner(mut self, scanner: Arc<S>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// 파드 표시기를 지정합니다.
    pub fn marker(mut self, marker: Arc<M>) -> Self {
        self.marker = Some(marker);
        self
    }

    /// 카탈로그 대상을 추가합니다.
    pub fn add_target(mut self, target: Arc<dyn DynCatalogTarget>) -> Self {
        self.targets.push(target);
        self
    }

    /// 외부 원장을 사용합니다. 지정하지 않으면 새로 만듭니다.
    pub fn ledger(mut self, ledger: Arc<DedupLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// 조정 엔진을 빌드합니다.
    pub fn build(self) -> Result<Reconciler<S, M>, ReconcilerError> {
        self.config.validate()?;
        let scanner = self
            .scanner
            .ok_or(ReconcilerError::MissingCollaborator("scanner"))?;
        let marker = self
            .marker
            .ok_or(ReconcilerError::MissingCollaborator("marker"))?;

        let mut names = HashMap::new();
        for target in &self.targets {
            if names.insert(target.name().to_owned(), ()).is_some() {
                return Err(ReconcilerError::Config {
                    field: "targets".to_owned(),
                    reason: format!("duplicate target name '{}'", target.name()),
                });
            }
        }
        if self.targets.is_empty() {
            warn!("no catalog target configured, scans will not be uploaded anywhere");
        }

        Ok(Reconciler {
            scan_permits: Semaphore::new(self.config.max_concurrent_scans),
            config: self.config,
            scanner,
            marker,
            targets: self
                .targets
                .into_iter()
                .map(|target| TargetSlot {
                    target,
                    health: RwLock::new(HealthStatus::Unhealthy("not initialized".to_owned())),
                })
                .collect(),
            ledger: self.ledger.unwrap_or_else(|| Arc::new(DedupLedger::new())),
            stats: ReconcilerStats::default(),
        })
    }
}
