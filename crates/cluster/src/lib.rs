//! Kubernetes collaborator for sbomsync.
//!
//! - [`client`]: API abstraction (`ClusterClient`, `KubeClusterClient`) and the
//!   processed-pod marker
//! - [`convert`]: `Pod` → `PodSnapshot` extraction and annotation helpers
//! - [`informer`]: watch cache (`PodInformer`, `PodCache`, `PodEvent`)

pub mod client;
pub mod convert;
pub mod informer;

pub use client::{
    ClusterClient, KubeClientConfig, KubeClusterClient, list_selected_pods, selector,
};
pub use convert::pod_snapshot;
pub use informer::{PodCache, PodEvent, PodInformer, WatchEvent};
