//! sbomsync 공통 크레이트
//!
//! 클러스터에서 실행 중인 컨테이너 이미지와 원격 보안 카탈로그의 인벤토리를
//! 맞추기 위한 공통 타입, 에러, 설정, 협력자 trait을 정의합니다.

pub mod config;
pub mod error;
pub mod image;
pub mod marker;
pub mod metrics;
pub mod pipeline;
pub mod scan;
pub mod target;
pub mod types;

// 에러
pub use error::{
    CatalogError, ClusterError, ConfigError, ImageParseError, SbomSyncError, ScanError,
};

// 설정
pub use config::SbomSyncConfig;

// 이미지
pub use image::{RegistryProxyMap, identity_of, normalize};

// 협력자 trait
pub use marker::PodMarker;
pub use pipeline::{BoxFuture, HealthStatus};
pub use scan::ImageScanner;
pub use target::{CatalogTarget, DynCatalogTarget};

// 도메인 타입
pub use types::{
    ContainerObservation, ImageIdentity, Inventory, PodKey, PodSnapshot, RemovalReport,
    ScanResult, TargetInventoryEntry,
};
