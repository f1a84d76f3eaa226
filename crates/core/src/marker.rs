//! 파드 처리 완료 표시 trait

use std::future::Future;

use crate::error::ClusterError;
use crate::types::PodSnapshot;

/// 모든 컨테이너가 모든 대상에 업로드된 파드를 표시합니다.
pub trait PodMarker: Send + Sync {
    /// 파드에 처리 완료 표시(어노테이션)를 기록합니다.
    fn mark_processed(
        &self,
        pod: &PodSnapshot,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}
