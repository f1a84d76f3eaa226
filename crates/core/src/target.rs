//! 원격 카탈로그 대상 trait
//!
//! 카탈로그 기술마다 [`CatalogTarget`]을 한 번 구현합니다. 리컨실러는
//! [`DynCatalogTarget`]을 통해 여러 대상을 `Vec<Arc<dyn DynCatalogTarget>>`로
//! 보관하므로 새 대상을 추가해도 조정 로직은 바뀌지 않습니다.
//!
//! # 호출 순서
//! ```text
//! initialize() → { load_inventory() | upload() | remove() }*
//! ```

use std::future::Future;

use crate::error::CatalogError;
use crate::pipeline::BoxFuture;
use crate::types::{Inventory, RemovalReport, ScanResult, TargetInventoryEntry};

/// 원격 카탈로그 하나에 대한 기능 계약
pub trait CatalogTarget: Send + Sync {
    /// 대상 이름 (로그, 상태 표시용)
    fn name(&self) -> &str;

    /// 루트 그룹 등 카탈로그 컨텍스트를 준비합니다.
    ///
    /// 다른 작업보다 먼저 호출됩니다. 실패하면 이번 실행에서 이 대상만 제외됩니다.
    fn initialize(&self) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// 현재 인벤토리 전체를 조회합니다.
    ///
    /// 네임스페이스별 조회 실패는 [`Inventory::failed_namespaces`]에 기록하고
    /// 해당 항목은 생략합니다.
    fn load_inventory(&self) -> impl Future<Output = Result<Inventory, CatalogError>> + Send;

    /// 스캔 결과를 업로드합니다.
    ///
    /// 그룹과 에셋이 없으면 만든 뒤 SBOM을 제출합니다. 같은 결과를 여러 번
    /// 업로드해도 카탈로그 상태는 한 번 업로드한 것과 같습니다.
    fn upload(&self, result: &ScanResult)
    -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// 항목들을 제거한 뒤 비게 된 네임스페이스 그룹도 정리합니다.
    ///
    /// 개별 항목 실패는 [`RemovalReport::failed`]로 집계되며 다른 항목의
    /// 제거를 막지 않습니다.
    fn remove(
        &self,
        entries: &[TargetInventoryEntry],
    ) -> impl Future<Output = Result<RemovalReport, CatalogError>> + Send;
}

/// dyn 호환 카탈로그 대상
///
/// [`CatalogTarget`]을 구현하면 자동으로 구현됩니다.
pub trait DynCatalogTarget: Send + Sync {
    /// 대상 이름
    fn name(&self) -> &str;

    /// 초기화
    fn initialize(&self) -> BoxFuture<'_, Result<(), CatalogError>>;

    /// 인벤토리 조회
    fn load_inventory(&self) -> BoxFuture<'_, Result<Inventory, CatalogError>>;

    /// 업로드
    fn upload<'a>(&'a self, result: &'a ScanResult) -> BoxFuture<'a, Result<(), CatalogError>>;

    /// 제거
    fn remove<'a>(
        &'a self,
        entries: &'a [TargetInventoryEntry],
    ) -> BoxFuture<'a, Result<RemovalReport, CatalogError>>;
}

impl<T: CatalogTarget> DynCatalogTarget for T {
    fn name(&self) -> &str {
        CatalogTarget::name(self)
    }

    fn initialize(&self) -> BoxFuture<'_, Result<(), CatalogError>> {
        Box::pin(CatalogTarget::initialize(self))
    }

    fn load_inventory(&self) -> BoxFuture<'_, Result<Inventory, CatalogError>> {
        Box::pin(CatalogTarget::load_inventory(self))
    }

    fn upload<'a>(&'a self, result: &'a ScanResult) -> BoxFuture<'a, Result<(), CatalogError>> {
        Box::pin(CatalogTarget::upload(self, result))
    }

    fn remove<'a>(
        &'a self,
        entries: &'a [TargetInventoryEntry],
    ) -> BoxFuture<'a, Result<RemovalReport, CatalogError>> {
        Box::pin(CatalogTarget::remove(self, entries))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::{ImageIdentity, PodSnapshot};

    struct CountingTarget {
        uploads: AtomicUsize,
    }

    impl CatalogTarget for CountingTarget {
        fn name(&self) -> &str {
            "counting"
        }

        async fn initialize(&self) -> Result<(), CatalogError> {
            Ok(())
        }

        async fn load_inventory(&self) -> Result<Inventory, CatalogError> {
            Ok(Inventory::default())
        }

        async fn upload(&self, _result: &ScanResult) -> Result<(), CatalogError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove(
            &self,
            entries: &[TargetInventoryEntry],
        ) -> Result<RemovalReport, CatalogError> {
            Ok(RemovalReport {
                removed: entries.len(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn blanket_impl_makes_target_object_safe() {
        let target = Arc::new(CountingTarget {
            uploads: AtomicUsize::new(0),
        });
        let targets: Vec<Arc<dyn DynCatalogTarget>> = vec![target.clone()];

        let pod = PodSnapshot::new("ns1", "p", BTreeMap::new(), [("app", "registry.io/app:1.0")]);
        let result = ScanResult::from_observation(&pod.containers[0], "{}".to_owned());

        for t in &targets {
            assert_eq!(t.name(), "counting");
            t.initialize().await.unwrap();
            t.upload(&result).await.unwrap();
            let report = t
                .remove(&[TargetInventoryEntry::from_identity(ImageIdentity::new(
                    "ns1",
                    "registry.io/app",
                ))])
                .await
                .unwrap();
            assert_eq!(report.removed, 1);
        }
        assert_eq!(target.uploads.load(Ordering::SeqCst), 1);
    }
}
