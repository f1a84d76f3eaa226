//! sbomsync 조정 엔진
//!
//! 클러스터에서 실행 중인 이미지를 스캔해 카탈로그에 올리고, 더 이상 실행되지
//! 않는 이미지를 카탈로그에서 정리합니다.
//!
//! # Module Structure
//!
//! - [`error`]: Construction errors (`ReconcilerError`)
//! - [`config`]: Reconciler configuration
//! - [`ledger`]: Dedup ledger (`DedupLedger`, `ClaimState`)
//! - [`diff`]: Container diffing and cross-pod usage checks
//! - [`stats`]: Counters exposed on the status endpoint
//! - [`reconciler`]: Full pass and incremental event handling (`Reconciler`, builder)

pub mod config;
pub mod diff;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod stats;

// --- Public API Re-exports ---

pub use config::ReconcilerConfig;
pub use error::ReconcilerError;
pub use ledger::{ClaimState, DedupLedger};
pub use reconciler::{PassReport, PodScanOutcome, Reconciler, ReconcilerBuilder, TargetStatus};
pub use stats::StatsSnapshot;
