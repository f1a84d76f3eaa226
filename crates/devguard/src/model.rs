//! DevGuard REST 엔터티와 이름 규칙
//!
//! 카탈로그 구조:
//!
//! ```text
//! <org>
//!  └─ root project (type = kubernetesCluster)
//!      └─ namespace project (type = kubernetesNamespace, name = <namespace>)
//!          └─ asset (name = <repository>, slug = slugify(name))
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 루트 프로젝트 유형
pub const KIND_CLUSTER: &str = "kubernetesCluster";
/// 네임스페이스 프로젝트 유형
pub const KIND_NAMESPACE: &str = "kubernetesNamespace";
/// 에셋 보안 요구 수준 기본값
pub const DEFAULT_REQUIREMENT: &str = "medium";

const CONTROLLED_BY: &str = "Controlled by an Kubernetes Operator.";
const IMAGE_MARKER: &str = "Image ";

/// 프로젝트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// 프로젝트 ID
    pub id: String,
    /// 슬러그
    pub slug: String,
    /// 표시 이름 (네임스페이스 프로젝트는 네임스페이스 이름)
    pub name: String,
    /// 상위 프로젝트 ID
    #[serde(default)]
    pub parent_id: Option<String>,
    /// 프로젝트 유형
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// 보관 여부
    #[serde(default)]
    pub archived: bool,
}

/// 에셋
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// 에셋 ID
    pub id: String,
    /// 슬러그
    pub slug: String,
    /// 이름
    pub name: String,
    /// 설명
    #[serde(default)]
    pub description: Option<String>,
    /// 보관 여부
    #[serde(default)]
    pub archived: bool,
}

impl Asset {
    /// 에셋이 추적하는 이미지 저장소
    ///
    /// 생성 시 설명에 기록한 저장소를 우선하고, 없으면 이름을 사용합니다.
    /// 어노테이션으로 이름을 바꾼 에셋도 원래 이미지와 대응됩니다.
    pub fn image_repository(&self) -> &str {
        self.description
            .as_deref()
            .and_then(|d| d.strip_prefix(CONTROLLED_BY))
            .and_then(|d| d.trim_start().strip_prefix(IMAGE_MARKER))
            .map(str::trim)
            .filter(|repo| !repo.is_empty())
            .unwrap_or(&self.name)
    }
}

/// 네임스페이스 프로젝트 생성 요청
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub parent_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NewProject {
    /// 루트 프로젝트 아래 네임스페이스 프로젝트
    pub fn namespace(namespace: &str, parent_id: &str) -> Self {
        Self {
            name: namespace.to_owned(),
            description: format!("{CONTROLLED_BY} Namespace {namespace}"),
            parent_id: parent_id.to_owned(),
            kind: KIND_NAMESPACE.to_owned(),
        }
    }
}

/// 에셋 생성 요청
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub name: String,
    pub description: String,
    pub confidentiality_requirement: String,
    pub integrity_requirement: String,
    pub availability_requirement: String,
}

impl NewAsset {
    /// 이미지 저장소를 추적하는 에셋
    pub fn for_image(name: &str, repository: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: format!("{CONTROLLED_BY} {IMAGE_MARKER}{repository}"),
            confidentiality_requirement: DEFAULT_REQUIREMENT.to_owned(),
            integrity_requirement: DEFAULT_REQUIREMENT.to_owned(),
            availability_requirement: DEFAULT_REQUIREMENT.to_owned(),
        }
    }
}

/// 이름을 슬러그로 바꿉니다.
///
/// 소문자 ASCII 영숫자만 남기고 나머지 연속 구간은 `-` 하나로 바꿉니다.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// 어노테이션에서 컨테이너별 에셋 이름/버전 재정의를 찾습니다.
///
/// 키는 `<annotation_key>/<container_name>`, 값은 `name[:version]`입니다.
/// 버전이 없으면 `latest`. 키가 비어 있거나 값이 비어 있으면 `None`.
pub fn asset_override(
    annotations: &BTreeMap<String, String>,
    annotation_key: &str,
    container_name: &str,
) -> Option<(String, String)> {
    let annotation_key = annotation_key.trim_end_matches('/');
    if annotation_key.is_empty() {
        return None;
    }
    let value = annotations.get(&format!("{annotation_key}/{container_name}"))?;
    let (name, version) = match value.trim().split_once(':') {
        Some((name, version)) => (name.trim(), version.trim()),
        None => (value.trim(), ""),
    };
    if name.is_empty() {
        return None;
    }
    let version = if version.is_empty() { "latest" } else { version };
    Some((name.to_owned(), version.to_owned()))
}
