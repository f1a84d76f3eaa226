//! sbomsync SBOM 스캐너
//!
//! 외부 `trivy` 프로세스로 컨테이너 이미지의 CycloneDX SBOM을 생성합니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`SbomScannerError`)
//! - [`config`]: Scanner configuration (`TrivyScannerConfig`, builder)
//! - [`scanner`]: Process adapter (`TrivyScanner`, `ImageScanner` impl)

pub mod config;
pub mod error;
pub mod scanner;

// --- Public API Re-exports ---

pub use config::{TrivyScannerConfig, TrivyScannerConfigBuilder};
pub use error::SbomScannerError;
pub use scanner::{TrivyScanner, TrivyScannerBuilder};
