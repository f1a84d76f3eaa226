//! Conversion from Kubernetes `Pod` objects to [`PodSnapshot`]s.
//!
//! Images are taken from the pod's container statuses (init, regular and
//! ephemeral), so a snapshot reflects what the kubelet actually runs. Pods
//! without statuses yet produce a snapshot with no containers.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use sbomsync_core::types::PodSnapshot;

/// Builds a snapshot from a pod. Returns `None` when name or namespace is missing.
pub fn pod_snapshot(pod: &Pod) -> Option<PodSnapshot> {
    let name = pod.metadata.name.as_deref()?;
    let namespace = pod.metadata.namespace.as_deref()?;
    let annotations = pod.metadata.annotations.clone().unwrap_or_default();

    let containers: Vec<(&str, &str)> = container_statuses(pod)
        .map(|status| (status.name.as_str(), status.image.as_str()))
        .collect();

    Some(PodSnapshot::new(namespace, name, annotations, containers))
}

fn container_statuses(pod: &Pod) -> impl Iterator<Item = &ContainerStatus> {
    pod.status.iter().flat_map(|status| {
        status
            .init_container_statuses
            .iter()
            .flatten()
            .chain(status.container_statuses.iter().flatten())
            .chain(status.ephemeral_container_statuses.iter().flatten())
    })
}

/// Annotation key marking a container as processed.
pub fn processed_annotation_key(prefix: &str, container_name: &str) -> String {
    format!("{}/{container_name}", prefix.trim_end_matches('/'))
}

/// Annotations recording that every container of the pod was uploaded.
pub fn processed_annotations(prefix: &str, pod: &PodSnapshot) -> BTreeMap<String, String> {
    pod.containers
        .iter()
        .map(|c| {
            (
                processed_annotation_key(prefix, &c.container_name),
                c.image_reference.clone(),
            )
        })
        .collect()
}

/// Whether the pod already carries processed annotations matching its current images.
pub fn is_marked_processed(prefix: &str, pod: &PodSnapshot) -> bool {
    !pod.containers.is_empty()
        && pod.containers.iter().all(|c| {
            pod.annotations
                .get(&processed_annotation_key(prefix, &c.container_name))
                .is_some_and(|v| v == &c.image_reference)
        })
}
