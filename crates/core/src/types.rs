//! 도메인 타입 — 크레이트 간에 공유되는 데이터 모델
//!
//! [`PodSnapshot`]과 [`ContainerObservation`]은 이벤트마다 새로 만들어지며
//! 변경되지 않습니다. [`TargetInventoryEntry`]는 원격 카탈로그가 소유합니다.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::image::{identity_of, version_of};

/// 네임스페이스 안의 이미지 저장소
///
/// 태그와 다이제스트를 제외하므로 같은 네임스페이스에서 같은 저장소의
/// 서로 다른 태그는 하나의 식별자로 취급됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageIdentity {
    /// 네임스페이스
    pub namespace: String,
    /// 태그/다이제스트가 제거된 저장소 이름
    pub repository: String,
}

impl ImageIdentity {
    /// 새 식별자를 생성합니다.
    pub fn new(namespace: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            repository: repository.into(),
        }
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.repository)
    }
}

/// 파드 식별 키 (namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    /// 네임스페이스
    pub namespace: String,
    /// 파드 이름
    pub name: String,
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// 파드에서 관찰된 컨테이너 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerObservation {
    /// 이미지 식별자
    pub identity: ImageIdentity,
    /// 태그/다이제스트를 포함한 전체 이미지 참조
    pub image_reference: String,
    /// 컨테이너 이름
    pub container_name: String,
    /// 파드 이름
    pub pod_name: String,
    /// 파드 네임스페이스
    pub pod_namespace: String,
    /// 파드 어노테이션
    pub pod_annotations: BTreeMap<String, String>,
}

impl ContainerObservation {
    /// 이미지 참조의 버전 (`latest` 기본값)
    pub fn version(&self) -> String {
        version_of(&self.image_reference)
    }
}

/// 파드 한 개의 관찰 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    /// 네임스페이스
    pub pod_namespace: String,
    /// 파드 이름
    pub pod_name: String,
    /// 어노테이션
    pub annotations: BTreeMap<String, String>,
    /// 컨테이너 목록 (순서 유지)
    pub containers: Vec<ContainerObservation>,
}

impl PodSnapshot {
    /// `(container_name, image_reference)` 목록으로 스냅샷을 만듭니다.
    pub fn new<'a>(
        namespace: &str,
        name: &str,
        annotations: BTreeMap<String, String>,
        containers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let containers = containers
            .into_iter()
            .filter(|(_, image)| !image.trim().is_empty())
            .map(|(container_name, image)| ContainerObservation {
                identity: identity_of(image, namespace),
                image_reference: image.to_owned(),
                container_name: container_name.to_owned(),
                pod_name: name.to_owned(),
                pod_namespace: namespace.to_owned(),
                pod_annotations: annotations.clone(),
            })
            .collect();
        Self {
            pod_namespace: namespace.to_owned(),
            pod_name: name.to_owned(),
            annotations,
            containers,
        }
    }

    /// 파드 키
    pub fn key(&self) -> PodKey {
        PodKey {
            namespace: self.pod_namespace.clone(),
            name: self.pod_name.clone(),
        }
    }

    /// 컨테이너들의 식별자
    pub fn identities(&self) -> impl Iterator<Item = &ImageIdentity> {
        self.containers.iter().map(|c| &c.identity)
    }
}

/// 원격 카탈로그가 보관 중인 에셋 하나
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetInventoryEntry {
    /// 네임스페이스
    pub namespace: String,
    /// 이미지 식별자
    pub identity: ImageIdentity,
    /// 원격 키 (에셋 슬러그 등). `None`이면 대상이 식별자로부터 계산합니다.
    pub remote_key: Option<String>,
}

impl TargetInventoryEntry {
    /// 원격 키 없이 식별자로 항목을 만듭니다.
    pub fn from_identity(identity: ImageIdentity) -> Self {
        Self {
            namespace: identity.namespace.clone(),
            identity,
            remote_key: None,
        }
    }
}

impl fmt::Display for TargetInventoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)
    }
}

/// 대상 하나의 인벤토리 스냅샷
///
/// 조회에 실패한 네임스페이스는 항목에서 빠지고 `failed_namespaces`에
/// 기록됩니다. 빈 네임스페이스로 해석하면 안 됩니다.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    entries: HashSet<TargetInventoryEntry>,
    by_identity: HashSet<ImageIdentity>,
    /// 조회에 실패한 네임스페이스
    pub failed_namespaces: BTreeSet<String>,
}

impl Inventory {
    /// 항목을 추가합니다. 이미 있던 항목이면 `false`.
    pub fn insert(&mut self, entry: TargetInventoryEntry) -> bool {
        self.by_identity.insert(entry.identity.clone());
        self.entries.insert(entry)
    }

    /// 조회된 항목
    pub fn entries(&self) -> impl Iterator<Item = &TargetInventoryEntry> {
        self.entries.iter()
    }

    /// 항목을 꺼냅니다.
    pub fn into_entries(self) -> Vec<TargetInventoryEntry> {
        self.entries.into_iter().collect()
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 식별자가 인벤토리에 있는지 여부
    pub fn contains_identity(&self, identity: &ImageIdentity) -> bool {
        self.by_identity.contains(identity)
    }

    /// 네임스페이스가 온전히 조회되었는지 여부
    pub fn is_namespace_complete(&self, namespace: &str) -> bool {
        !self.failed_namespaces.contains(namespace)
    }
}

/// 스캔 한 건의 결과
///
/// 각 대상에 한 번씩 전달된 뒤 버려집니다.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// 이미지 식별자
    pub identity: ImageIdentity,
    /// 전체 이미지 참조
    pub image_reference: String,
    /// SBOM 문서 (CycloneDX JSON)
    pub sbom: String,
    /// 컨테이너 이름
    pub container_name: String,
    /// 파드 네임스페이스
    pub pod_namespace: String,
    /// 파드 어노테이션
    pub pod_annotations: BTreeMap<String, String>,
}

impl ScanResult {
    /// 관찰된 컨테이너와 SBOM으로 결과를 만듭니다.
    pub fn from_observation(container: &ContainerObservation, sbom: String) -> Self {
        Self {
            identity: container.identity.clone(),
            image_reference: container.image_reference.clone(),
            sbom,
            container_name: container.container_name.clone(),
            pod_namespace: container.pod_namespace.clone(),
            pod_annotations: container.pod_annotations.clone(),
        }
    }

    /// 업로드 버전 (`latest` 기본값)
    pub fn version(&self) -> String {
        version_of(&self.image_reference)
    }
}

/// `remove` 호출 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// 제거된 항목 수
    pub removed: usize,
    /// 실패한 항목 수
    pub failed: usize,
    /// 비어서 함께 정리된 네임스페이스 그룹
    pub emptied_namespaces: Vec<String>,
}
