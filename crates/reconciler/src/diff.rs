//! 컨테이너 diff와 교차 파드 사용 여부 판단
//!
//! diff는 전체 이미지 참조로 비교하므로 태그 변경은 "이전 참조 제거 +
//! 새 참조 추가"가 됩니다. 제거 여부는 식별자(네임스페이스, 저장소) 단위로
//! 판단합니다.

use std::collections::HashSet;

use sbomsync_core::types::{ContainerObservation, ImageIdentity, PodKey, PodSnapshot};

/// 파드 갱신 전후의 컨테이너 차이
#[derive(Debug, Default)]
pub struct ContainerDiff {
    /// 새로 나타난 참조의 컨테이너
    pub added: Vec<ContainerObservation>,
    /// 사라진 참조의 컨테이너
    pub removed: Vec<ContainerObservation>,
}

impl ContainerDiff {
    /// 변화가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// 두 스냅샷의 컨테이너를 전체 이미지 참조로 비교합니다.
pub fn diff_containers(old: &PodSnapshot, new: &PodSnapshot) -> ContainerDiff {
    let old_refs: HashSet<&str> = old
        .containers
        .iter()
        .map(|c| c.image_reference.as_str())
        .collect();
    let new_refs: HashSet<&str> = new
        .containers
        .iter()
        .map(|c| c.image_reference.as_str())
        .collect();

    ContainerDiff {
        added: new
            .containers
            .iter()
            .filter(|c| !old_refs.contains(c.image_reference.as_str()))
            .cloned()
            .collect(),
        removed: old
            .containers
            .iter()
            .filter(|c| !new_refs.contains(c.image_reference.as_str()))
            .cloned()
            .collect(),
    }
}

/// 제외한 파드 외에 같은 네임스페이스의 다른 파드가 식별자를 사용하는지 여부
pub fn identity_in_use(identity: &ImageIdentity, cache: &[PodSnapshot], exclude: &PodKey) -> bool {
    cache
        .iter()
        .filter(|pod| pod.pod_namespace == identity.namespace)
        .filter(|pod| pod.pod_namespace != exclude.namespace || pod.pod_name != exclude.name)
        .any(|pod| pod.identities().any(|id| id == identity))
}

/// 제거된 컨테이너 중 더 이상 아무도 쓰지 않는 식별자
///
/// `retained`는 이벤트 대상 파드에 남아 있는 컨테이너입니다. 여기에 같은
/// 식별자가 있으면 제거하지 않습니다.
pub fn orphaned_identities(
    removed: &[ContainerObservation],
    retained: &[&ContainerObservation],
    cache: &[PodSnapshot],
    pod: &PodKey,
) -> Vec<ImageIdentity> {
    let mut seen = HashSet::new();
    removed
        .iter()
        .map(|c| &c.identity)
        .filter(|identity| seen.insert((*identity).clone()))
        .filter(|identity| !retained.iter().any(|c| &c.identity == *identity))
        .filter(|identity| !identity_in_use(identity, cache, pod))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn pod(ns: &str, name: &str, containers: &[(&str, &str)]) -> PodSnapshot {
        PodSnapshot::new(ns, name, BTreeMap::new(), containers.iter().copied())
    }

    #[test]
    fn tag_change_is_remove_plus_add() {
        let old = pod("ns1", "p", &[("app", "registry.io/app:1.0")]);
        let new = pod("ns1", "p", &[("app", "registry.io/app:2.0")]);
        let diff = diff_containers(&old, &new);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].image_reference, "registry.io/app:2.0");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].image_reference, "registry.io/app:1.0");
    }

    #[test]
    fn unchanged_pod_has_empty_diff() {
        let old = pod("ns1", "p", &[("app", "registry.io/app:1.0"), ("side", "envoy:1")]);
        let diff = diff_containers(&old, &old.clone());
        assert!(diff.is_empty());
    }

    #[test]
    fn identity_in_use_ignores_excluded_pod_and_other_namespaces() {
        let identity = ImageIdentity::new("ns1", "registry.io/app");
        let cache = vec![
            pod("ns1", "self", &[("app", "registry.io/app:1.0")]),
            pod("ns2", "other", &[("app", "registry.io/app:1.0")]),
        ];
        let me = PodKey {
            namespace: "ns1".to_owned(),
            name: "self".to_owned(),
        };
        assert!(!identity_in_use(&identity, &cache, &me));

        let mut cache = cache;
        cache.push(pod("ns1", "sibling", &[("app", "registry.io/app:0.9")]));
        assert!(identity_in_use(&identity, &cache, &me));
    }

    #[test]
    fn orphaned_identities_respects_retained_containers() {
        let old = pod(
            "ns1",
            "p",
            &[("a", "registry.io/app:1.0"), ("b", "registry.io/app:2.0")],
        );
        let new = pod(
            "ns1",
            "p",
            &[("a", "registry.io/app:2.0"), ("b", "registry.io/app:2.0")],
        );
        let diff = diff_containers(&old, &new);
        let retained: Vec<_> = new
            .containers
            .iter()
            .filter(|c| !diff.added.iter().any(|a| a.image_reference == c.image_reference))
            .collect();
        let orphans = orphaned_identities(&diff.removed, &retained, &[new.clone()], &new.key());
        assert!(orphans.is_empty());
    }

    #[test]
    fn orphaned_identities_are_deduplicated() {
        let old = pod(
            "ns1",
            "p",
            &[("a", "registry.io/app:1.0"), ("b", "registry.io/app:1.1")],
        );
        let orphans = orphaned_identities(&old.containers, &[], &[], &old.key());
        assert_eq!(orphans, vec![ImageIdentity::new("ns1", "registry.io/app")]);
    }
}
