//! 스캐너 trait

use std::future::Future;

use crate::error::ScanError;

/// 이미지 참조 하나를 스캔하여 SBOM 텍스트를 만드는 스캐너
pub trait ImageScanner: Send + Sync {
    /// 스캐너 이름 (`X-Scanner` 등 메타데이터용)
    fn name(&self) -> &str;

    /// 이미지를 스캔합니다. 빈 출력이나 비정상 종료는 [`ScanError`]입니다.
    fn scan(&self, image_reference: &str)
    -> impl Future<Output = Result<String, ScanError>> + Send;
}
