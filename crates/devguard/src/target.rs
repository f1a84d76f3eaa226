//! DevGuard 카탈로그 대상 -- [`CatalogTarget`] 구현
//!
//! # 업로드 흐름
//!
//! ```text
//! ScanResult
//!   -> namespace project (get, 404 → create, 409 → get)
//!   -> asset            (get, 404 → create, 409 → get, archived → unarchive)
//!   -> POST /api/v1/scan/  (X-Asset-Name, X-Asset-Version, ...)
//! ```
//!
//! 모든 단계가 "없으면 생성"이므로 같은 결과를 여러 번 업로드해도
//! 프로젝트와 에셋은 하나씩만 존재합니다.

use std::collections::BTreeSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use sbomsync_core::error::CatalogError;
use sbomsync_core::target::CatalogTarget;
use sbomsync_core::types::{
    ImageIdentity, Inventory, RemovalReport, ScanResult, TargetInventoryEntry,
};

use crate::client::{DevGuardClient, ScanUpload};
use crate::config::{DevGuardTargetConfig, RemovalMode};
use crate::error::DevGuardError;
use crate::model::{Asset, KIND_CLUSTER, NewAsset, NewProject, Project, asset_override, slugify};

const TARGET_NAME: &str = "devguard";
const CONFLICT: u16 = 409;

/// DevGuard 카탈로그 대상
pub struct DevGuardTarget {
    config: DevGuardTargetConfig,
    client: DevGuardClient,
    /// `initialize`에서 조회한 루트 프로젝트
    root: RwLock<Option<Project>>,
    uploads_completed: AtomicU64,
    uploads_failed: AtomicU64,
}

impl DevGuardTarget {
    /// 대상을 생성합니다. 네트워크 요청은 `initialize`에서 시작됩니다.
    pub fn new(config: DevGuardTargetConfig) -> Result<Self, DevGuardError> {
        config.validate()?;
        let client = DevGuardClient::new(&config)?;
        Ok(Self {
            config,
            client,
            root: RwLock::new(None),
            uploads_completed: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
        })
    }

    /// 설정
    pub fn config(&self) -> &DevGuardTargetConfig {
        &self.config
    }

    /// 성공한 업로드 수
    pub fn uploads_completed(&self) -> u64 {
        self.uploads_completed.load(Ordering::Relaxed)
    }

    /// 실패한 업로드 수
    pub fn uploads_failed(&self) -> u64 {
        self.uploads_failed.load(Ordering::Relaxed)
    }

    /// 루트 프로젝트 ID. 초기화 전이면 에러.
    fn root_id(&self) -> Result<String, CatalogError> {
        self.root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or_else(|| CatalogError::NotInitialized {
                target: TARGET_NAME.to_owned(),
            })
    }

    /// 컨테이너의 에셋 이름과 버전
    fn asset_name_and_version(&self, result: &ScanResult) -> (String, String) {
        if let Some((name, version)) = asset_override(
            &result.pod_annotations,
            &self.config.asset_name_annotation_key,
            &result.container_name,
        ) {
            info!(
                container = %result.container_name,
                asset = %name,
                version = %version,
                "asset name taken from pod annotation"
            );
            return (name, version);
        }
        (result.identity.repository.clone(), result.version())
    }

    async fn ensure_namespace_project(
        &self,
        namespace: &str,
        root_id: &str,
    ) -> Result<Project, CatalogError> {
        let slug = slugify(namespace);
        match self.client.get_project(&slug).await {
            Ok(project) if project.archived => {
                debug!(namespace, project = %project.slug, "unarchiving namespace project");
                self.client
                    .patch_project(&project.slug, &json!({ "archived": false }))
                    .await?;
                return Ok(project);
            }
            Ok(project) => return Ok(project),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        debug!(namespace, project = %slug, "creating namespace project");
        match self
            .client
            .create_project(&NewProject::namespace(namespace, root_id))
            .await
        {
            Ok(project) => {
                info!(namespace, project = %project.slug, "namespace project created");
                Ok(project)
            }
            Err(CatalogError::Status { status: CONFLICT, .. }) => {
                self.client.get_project(&slug).await
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_asset(
        &self,
        project: &str,
        name: &str,
        repository: &str,
    ) -> Result<Asset, CatalogError> {
        let slug = slugify(name);
        match self.client.get_asset(project, &slug).await {
            Ok(asset) if asset.archived => {
                debug!(project, asset = %asset.slug, "unarchiving asset");
                self.client
                    .patch_asset(project, &asset.slug, &json!({ "archived": false }))
                    .await?;
                return Ok(asset);
            }
            Ok(asset) => return Ok(asset),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        debug!(project, asset = %slug, "creating asset");
        match self
            .client
            .create_asset(project, &NewAsset::for_image(name, repository))
            .await
        {
            Ok(asset) => {
                info!(project, asset = %asset.slug, "asset created");
                Ok(asset)
            }
            Err(CatalogError::Status { status: CONFLICT, .. }) => {
                self.client.get_asset(project, &slug).await
            }
            Err(e) => Err(e),
        }
    }

    async fn upload_inner(&self, result: &ScanResult) -> Result<(), CatalogError> {
        let root_id = self.root_id()?;
        let (asset_name, version) = self.asset_name_and_version(result);

        let project = self
            .ensure_namespace_project(&result.pod_namespace, &root_id)
            .await?;
        let asset = self
            .ensure_asset(&project.slug, &asset_name, &result.identity.repository)
            .await?;

        let qualified = format!(
            "{}/projects/{}/assets/{}",
            self.config.organization, project.slug, asset.slug
        );
        info!(asset = %qualified, version = %version, "sending sbom to devguard");
        self.client
            .upload_scan(
                &ScanUpload {
                    asset_name: &qualified,
                    asset_version: &version,
                    scanner: &self.config.scanner_id,
                },
                result.sbom.clone(),
            )
            .await
    }

    /// 항목의 에셋 슬러그
    ///
    /// 원격 키가 없으면 프로젝트의 에셋 중 같은 저장소를 가리키는 것을 찾습니다.
    /// 어노테이션으로 이름이 바뀐 에셋도 이렇게 찾아집니다.
    async fn resolve_asset_slug(&self, project: &str, entry: &TargetInventoryEntry) -> String {
        if let Some(key) = &entry.remote_key {
            return key.clone();
        }
        let repository = entry.identity.repository.as_str();
        match self.client.list_assets(project).await {
            Ok(assets) => {
                if let Some(asset) = assets
                    .iter()
                    .find(|a| !a.archived && a.image_repository() == repository)
                {
                    return asset.slug.clone();
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => debug!(project, error = %e, "could not list assets, falling back to derived slug"),
        }
        slugify(repository)
    }

    async fn retire_asset(&self, project: &str, asset: &str) -> Result<(), CatalogError> {
        let outcome = match self.config.removal_mode {
            RemovalMode::Delete => self.client.delete_asset(project, asset).await,
            RemovalMode::Archive => {
                self.client
                    .patch_asset(project, asset, &json!({ "archived": true }))
                    .await
            }
        };
        match outcome {
            Err(e) if e.is_not_found() => {
                debug!(project, asset, "asset already gone");
                Ok(())
            }
            other => other,
        }
    }

    async fn retire_project(&self, project: &str) -> Result<(), CatalogError> {
        match self.config.removal_mode {
            RemovalMode::Delete => self.client.delete_project(project).await,
            RemovalMode::Archive => {
                self.client
                    .patch_project(project, &json!({ "archived": true }))
                    .await
            }
        }
    }

    /// 네임스페이스 프로젝트가 비었으면 정리합니다. 정리했으면 `true`.
    async fn retire_if_empty(&self, namespace: &str) -> bool {
        let project = slugify(namespace);
        let assets = match self.client.list_assets(&project).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(namespace, error = %e, "could not check namespace project for remaining assets");
                return false;
            }
        };
        if assets.iter().any(|a| !a.archived) {
            return false;
        }
        match self.retire_project(&project).await {
            Ok(()) => {
                info!(namespace, project = %project, mode = %self.config.removal_mode, "empty namespace project removed");
                true
            }
            Err(e) => {
                warn!(namespace, error = %e, "could not remove empty namespace project");
                false
            }
        }
    }
}

impl CatalogTarget for DevGuardTarget {
    fn name(&self) -> &str {
        TARGET_NAME
    }

    async fn initialize(&self) -> Result<(), CatalogError> {
        let root = self.client.get_project(&self.config.root_project).await?;
        if root.kind.as_deref() != Some(KIND_CLUSTER) {
            info!(project = %root.slug, "marking root project as kubernetes cluster");
            self.client
                .patch_project(&root.slug, &json!({ "type": KIND_CLUSTER }))
                .await?;
        }
        info!(
            organization = %self.config.organization,
            project = %root.slug,
            "devguard target initialized"
        );
        *self.root.write().unwrap_or_else(|e| e.into_inner()) = Some(root);
        Ok(())
    }

    async fn load_inventory(&self) -> Result<Inventory, CatalogError> {
        let root_id = self.root_id()?;
        let projects = self
            .client
            .list_child_projects(&root_id)
            .await
            .map_err(|e| CatalogError::InventoryFetch {
                reason: e.to_string(),
            })?;

        let fetched = join_all(projects.iter().map(|project| async move {
            (project, self.client.list_assets(&project.slug).await)
        }))
        .await;

        let mut inventory = Inventory::default();
        for (project, assets) in fetched {
            match assets {
                Ok(assets) => {
                    for asset in assets.iter().filter(|a| !a.archived) {
                        inventory.insert(TargetInventoryEntry {
                            namespace: project.name.clone(),
                            identity: ImageIdentity::new(&project.name, asset.image_repository()),
                            remote_key: Some(asset.slug.clone()),
                        });
                    }
                }
                Err(e) => {
                    warn!(namespace = %project.name, error = %e, "could not fetch assets, namespace excluded from removal");
                    inventory.failed_namespaces.insert(project.name.clone());
                }
            }
        }

        debug!(
            entries = inventory.len(),
            failed_namespaces = inventory.failed_namespaces.len(),
            "devguard inventory loaded"
        );
        Ok(inventory)
    }

    async fn upload(&self, result: &ScanResult) -> Result<(), CatalogError> {
        if result.sbom.trim().is_empty() {
            info!(image = %result.image_reference, "empty sbom, skipping upload");
            return Ok(());
        }

        match self.upload_inner(result).await {
            Ok(()) => {
                self.uploads_completed.fetch_add(1, Ordering::Relaxed);
                info!(image = %result.image_reference, "uploaded sbom to devguard");
                Ok(())
            }
            Err(e) => {
                self.uploads_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn remove(&self, entries: &[TargetInventoryEntry]) -> Result<RemovalReport, CatalogError> {
        let outcomes = join_all(entries.iter().map(|entry| async move {
            let project = slugify(&entry.namespace);
            let asset = self.resolve_asset_slug(&project, entry).await;
            (entry, self.retire_asset(&project, &asset).await)
        }))
        .await;

        let mut report = RemovalReport::default();
        for (entry, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    report.removed += 1;
                    info!(entry = %entry, mode = %self.config.removal_mode, "asset removed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(entry = %entry, error = %e, "could not remove asset");
                }
            }
        }
        let namespaces: BTreeSet<&str> = entries.iter().map(|e| e.namespace.as_str()).collect();
        let retired = join_all(
            namespaces
                .iter()
                .map(|ns| async move { (*ns, self.retire_if_empty(ns).await) }),
        )
        .await;
        report.emptied_namespaces = retired
            .into_iter()
            .filter_map(|(ns, retired)| retired.then(|| ns.to_owned()))
            .collect();

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::DevGuardTargetConfigBuilder;

    fn target(annotation_key: &str) -> DevGuardTarget {
        let config = DevGuardTargetConfigBuilder::new()
            .api_url("http://127.0.0.1:9")
            .token("secret")
            .project_name("acme/projects/cluster")
            .asset_name_annotation_key(annotation_key)
            .build()
            .unwrap();
        DevGuardTarget::new(config).unwrap()
    }

    fn result(annotations: BTreeMap<String, String>) -> ScanResult {
        ScanResult {
            identity: ImageIdentity::new("shop", "registry.io/app"),
            image_reference: "registry.io/app:1.0".to_owned(),
            sbom: "{}".to_owned(),
            container_name: "web".to_owned(),
            pod_namespace: "shop".to_owned(),
            pod_annotations: annotations,
        }
    }

    #[test]
    fn asset_name_defaults_to_repository_and_tag() {
        let target = target("");
        let (name, version) = target.asset_name_and_version(&result(BTreeMap::new()));
        assert_eq!(name, "registry.io/app");
        assert_eq!(version, "1.0");
    }

    #[test]
    fn asset_name_uses_annotation_override() {
        let target = target("devguard.org/asset");
        let annotations =
            BTreeMap::from([("devguard.org/asset/web".to_owned(), "storefront:9".to_owned())]);
        let (name, version) = target.asset_name_and_version(&result(annotations));
        assert_eq!(name, "storefront");
        assert_eq!(version, "9");
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let target = target("");
        let err = target.load_inventory().await.unwrap_err();
        assert!(matches!(err, CatalogError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn empty_sbom_is_skipped_without_network() {
        let target = target("");
        let mut empty = result(BTreeMap::new());
        empty.sbom = "  ".to_owned();
        target.upload(&empty).await.unwrap();
        assert_eq!(target.uploads_completed(), 0);
        assert_eq!(target.uploads_failed(), 0);
    }
}
