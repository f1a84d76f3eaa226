//! sbomsync DevGuard 대상
//!
//! 스캔 결과를 DevGuard에 업로드하고, 클러스터에서 사라진 이미지의 에셋을
//! 정리합니다. 네임스페이스마다 루트 프로젝트 아래 하위 프로젝트를 하나 두고
//! 이미지 저장소마다 에셋을 하나 둡니다.
//!
//! # Module Structure
//!
//! - [`error`]: Construction errors (`DevGuardError`)
//! - [`config`]: Target configuration (`DevGuardTargetConfig`, builder, `RemovalMode`)
//! - [`model`]: REST entities (`Project`, `Asset`) and slug/annotation rules
//! - [`client`]: REST client (`DevGuardClient`)
//! - [`target`]: `CatalogTarget` implementation (`DevGuardTarget`)

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod target;

// --- Public API Re-exports ---

pub use client::DevGuardClient;
pub use config::{DevGuardTargetConfig, DevGuardTargetConfigBuilder, RemovalMode};
pub use error::DevGuardError;
pub use model::{Asset, Project, slugify};
pub use target::DevGuardTarget;
